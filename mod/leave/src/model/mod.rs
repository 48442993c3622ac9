pub mod local;
pub mod outstation;
pub mod stage;

pub use local::{CreateLocalLeave, LocalDecideRequest, LocalLeave, LocalStatus};
pub use outstation::{
    CreateOutstationLeave, FinalStatus, OutstationLeave, Rejection, StageDecideRequest,
    StageDecision, StageOutcome,
};
pub use stage::{Stage, StageScope};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Course
// ---------------------------------------------------------------------------

/// Programme the requesting student is enrolled in. Decides which
/// approval sequence an outstation record walks (see [`stage`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Course {
    Btech,
    Mtech,
    Phd,
}

impl Course {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Btech => "btech",
            Self::Mtech => "mtech",
            Self::Phd => "phd",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "btech" => Some(Self::Btech),
            "mtech" => Some(Self::Mtech),
            "phd" => Some(Self::Phd),
            _ => None,
        }
    }

    /// Doctoral records walk the longer sequence with instructor, dpgc
    /// and dean stages.
    pub fn is_doctoral(&self) -> bool {
        matches!(self, Self::Phd)
    }
}

impl std::fmt::Display for Course {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// UtilizationStatus
// ---------------------------------------------------------------------------

/// Whether an approved leave record's physical crossing has not started,
/// is underway, or has finished.
///
/// ```text
/// pending → in_use → completed
/// ```
///
/// Only the gate decision path moves this; approvers never touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationStatus {
    Pending,
    InUse,
    Completed,
}

impl UtilizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InUse => "in_use",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_use" => Some(Self::InUse),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for UtilizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// LeaveKind + record numbers
// ---------------------------------------------------------------------------

/// The two record kinds, and the prefix convention that routes a bare
/// record number ("L-00008", "OS-00002") back to its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveKind {
    Local,
    Outstation,
}

impl LeaveKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Local => "L",
            Self::Outstation => "OS",
        }
    }

    /// Render a sequence value as a record number, e.g. `OS-00002`.
    pub fn format_number(&self, seq: i64) -> String {
        format!("{}-{:05}", self.prefix(), seq)
    }
}

/// Classify a record number by its prefix. `None` for anything that
/// does not look like a record number.
pub fn kind_for_number(number: &str) -> Option<LeaveKind> {
    let (prefix, rest) = number.split_once('-')?;
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match prefix {
        "L" => Some(LeaveKind::Local),
        "OS" => Some(LeaveKind::Outstation),
        _ => None,
    }
}

/// Summary of a leave record handed to the gate module when a crossing
/// credential is bound to a record number.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatepassSummary {
    pub number: String,
    pub kind: LeaveKind,
    pub student_id: String,
    pub purpose: String,
    pub place: String,
    /// Date of leaving for outstation, the trip date for local.
    pub leaving: String,
    /// Expected date/time of return.
    pub returning: String,
    pub approved: bool,
    pub utilization: UtilizationStatus,
    pub exit_used: bool,
}
