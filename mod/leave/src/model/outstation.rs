use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::stage::Stage;
use super::{Course, UtilizationStatus};

// ---------------------------------------------------------------------------
// FinalStatus / StageOutcome
// ---------------------------------------------------------------------------

/// Overall outcome of an outstation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Pending,
    Approved,
    Rejected,
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Approved,
    Rejected,
}

// ---------------------------------------------------------------------------
// Per-stage decision records
// ---------------------------------------------------------------------------

/// The decision one approver recorded at one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDecision {
    pub status: StageOutcome,
    pub decided_by: String,
    pub decided_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Where and by whom a record was rejected. Set once, never cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub stage: Stage,
    pub decided_by: String,
    pub decided_at: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// OutstationLeave
// ---------------------------------------------------------------------------

/// An outstation leave record: a multi-day absence walked through the
/// course-dependent approval sequence (see [`super::stage`]).
///
/// Exactly one stage is current while `final_status` is pending. A
/// rejection at any stage freezes the record permanently. Utilization
/// fields are written only by the gate decision path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutstationLeave {
    pub id: String,
    /// Record number, `OS-` + zero-padded sequence (e.g. `OS-00002`).
    pub number: String,

    // --- requester ---
    pub student_id: String,
    pub student_name: String,
    pub department: String,
    pub course: Course,
    /// Instructor named by the student; doctoral records only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructor_id: Option<String>,

    // --- leave details ---
    /// `YYYY-MM-DD`.
    pub date_of_leaving: String,
    /// `YYYY-MM-DD`.
    pub date_of_returning: String,
    pub purpose: String,
    pub place: String,
    /// Opaque proof-document reference from the upload store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,

    // --- workflow ---
    pub current_stage: Stage,
    pub final_status: FinalStatus,
    /// Decisions recorded so far, keyed by stage name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stage_status: BTreeMap<Stage, StageDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<Rejection>,

    // --- stage enrichments ---
    /// Attendance percentage recorded by the office secretary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance: Option<f64>,
    /// Remaining leave balance in days; doctoral records only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leave_balance: Option<i64>,

    // --- utilization (gate-owned) ---
    pub utilization_status: UtilizationStatus,
    #[serde(default)]
    pub exit_used: bool,
    #[serde(default)]
    pub entry_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_out_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_in_at: Option<String>,

    pub created_at: String,
}

impl OutstationLeave {
    /// Whether the workflow can still move.
    pub fn is_open(&self) -> bool {
        self.final_status == FinalStatus::Pending && self.current_stage != Stage::Completed
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Payload for creating an outstation leave record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutstationLeave {
    pub course: Course,
    pub date_of_leaving: String,
    pub date_of_returning: String,
    pub purpose: String,
    pub place: String,
    /// Required for doctoral records, rejected otherwise.
    #[serde(default)]
    pub instructor_id: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
}

/// Payload for an approver's decision at the record's current stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDecideRequest {
    pub decision: StageOutcome,
    /// Mandatory when rejecting.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Office secretary stage only.
    #[serde(default)]
    pub attendance: Option<f64>,
    /// Doctoral records only.
    #[serde(default)]
    pub leave_balance: Option<i64>,
}
