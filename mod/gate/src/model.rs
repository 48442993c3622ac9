use serde::{Deserialize, Serialize};

use leave::model::GatepassSummary;

/// Where a student currently is, as far as the gate knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Inside,
    Outside,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Inside => "inside",
            Presence::Outside => "outside",
        }
    }
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way a crossing goes. Never taken from the caller; always
/// derived from the student's current presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Exit,
    Entry,
}

impl Direction {
    pub fn for_presence(presence: Presence) -> Self {
        match presence {
            Presence::Inside => Direction::Exit,
            Presence::Outside => Direction::Entry,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Exit => "exit",
            Direction::Entry => "entry",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Pending,
    Approved,
    Rejected,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Pending => "pending",
            TokenStatus::Approved => "approved",
            TokenStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossingOutcome {
    Approved,
    Denied,
}

/// What a student told the gate on their way out. Present only while
/// the student is outside.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitContext {
    pub purpose: String,
    pub place: String,
    pub out_at: String,
}

/// The gate's projection of one student: presence plus the references
/// an entry crossing has to settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub presence: Presence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_context: Option<ExitContext>,
    /// Active local record number, set on a record-bound exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_local: Option<String>,
    /// Active outstation record number, set on a record-bound exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_outstation: Option<String>,
}

impl Student {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            presence: Presence::Inside,
            exit_context: None,
            active_local: None,
            active_outstation: None,
        }
    }
}

/// A single-use crossing credential. Only the hash of the secret is
/// ever persisted; the raw secret lives in the response that minted it
/// and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateToken {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    pub token_hash: String,
    pub status: TokenStatus,
    pub expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_number: Option<String>,
    pub created_at: String,
}

impl GateToken {
    /// Lazily-checked expiry. Timestamps share one generator, so the
    /// string comparison is chronological.
    pub fn is_expired(&self, now: &str) -> bool {
        self.expires_at.as_str() <= now
    }
}

/// One leg (exit or entry) of a crossing, recorded once it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossingLeg {
    pub outcome: CrossingOutcome,
    pub at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
}

/// One audit row. A row opened by an exit has `entry: None` until the
/// matching entry crossing fills it in; after that it never changes.
/// Entry-only rows exist solely as a fallback when no open exit row
/// can be found for the student.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossingLog {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub guard_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_number: Option<String>,
    /// Direction of the originating event; `exit` for every paired row.
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<CrossingLeg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<CrossingLeg>,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// Body for POST /token. Carries no direction; the server derives it
/// from presence.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenRequest {
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub record_number: Option<String>,
}

/// What the student gets back: the scannable code and its metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub token: String,
    pub token_id: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_number: Option<String>,
    pub expires_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    pub code: String,
}

/// What the guard sees after a scan, before deciding.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPreview {
    pub token_id: String,
    pub student_id: String,
    pub student_name: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    pub expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<GatepassSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecideRequest {
    pub decision: GateDecision,
}

/// Body for a tokenless crossing recorded by the guard directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualCrossingRequest {
    pub student_id: String,
    pub direction: Direction,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub record_number: Option<String>,
}

/// Outcome of a gate decision or a manual crossing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossingResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    pub student_id: String,
    pub direction: Direction,
    pub approved: bool,
    pub presence: Presence,
}
