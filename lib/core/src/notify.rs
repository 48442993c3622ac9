use serde::{Deserialize, Serialize};
use tracing::info;

use crate::directory::Person;
use crate::error::ServiceError;

/// A notification payload produced by a service.
///
/// Notices are emitted after a state change has committed and are
/// delivered best-effort through the outbox; no service operation ever
/// waits on or fails because of one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notice {
    /// A leave record reached an approver's stage.
    #[serde(rename_all = "camelCase")]
    ApprovalRequested {
        recipient: Person,
        record_number: String,
        requester_name: String,
        stage: String,
    },

    /// A leave record reached a terminal status.
    #[serde(rename_all = "camelCase")]
    LeaveResolved {
        recipient: Person,
        record_number: String,
        approved: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// A gate decision was made on the recipient's crossing.
    #[serde(rename_all = "camelCase")]
    GateOutcome {
        recipient: Person,
        direction: String,
        approved: bool,
        presence: String,
    },
}

impl Notice {
    pub fn recipient(&self) -> &Person {
        match self {
            Notice::ApprovalRequested { recipient, .. } => recipient,
            Notice::LeaveResolved { recipient, .. } => recipient,
            Notice::GateOutcome { recipient, .. } => recipient,
        }
    }
}

/// Delivery channel for notices (mail gateway, push relay, ...).
///
/// The real transport is external; implementations adapt it. Failures
/// are logged by the dispatcher and never propagate to the operation
/// that emitted the notice.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice) -> Result<(), ServiceError>;
}

/// Notifier that writes notices to the log. Default when no real
/// transport is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) -> Result<(), ServiceError> {
        match notice {
            Notice::ApprovalRequested { recipient, record_number, requester_name, stage } => {
                info!(
                    to = %recipient.id,
                    record = %record_number,
                    stage = %stage,
                    "approval requested by {requester_name}"
                );
            }
            Notice::LeaveResolved { recipient, record_number, approved, reason } => {
                info!(
                    to = %recipient.id,
                    record = %record_number,
                    approved = approved,
                    reason = reason.as_deref().unwrap_or(""),
                    "leave resolved"
                );
            }
            Notice::GateOutcome { recipient, direction, approved, presence } => {
                info!(
                    to = %recipient.id,
                    direction = %direction,
                    approved = approved,
                    presence = %presence,
                    "gate outcome"
                );
            }
        }
        Ok(())
    }
}
