use serde::{Deserialize, Serialize};

use super::UtilizationStatus;

// ---------------------------------------------------------------------------
// LocalStatus
// ---------------------------------------------------------------------------

/// Approval state of a local (single day trip) record. One decision,
/// made by the hostel office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalStatus {
    Pending,
    Approved,
    Denied,
}

impl LocalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }
}

impl std::fmt::Display for LocalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// LocalLeave
// ---------------------------------------------------------------------------

/// A local leave record: one day trip out of campus and back, approved
/// in a single step by the hostel office.
///
/// Leave details are immutable after creation. `status` is written once
/// by the office; utilization fields are written only by the gate
/// decision path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalLeave {
    pub id: String,
    /// Record number, `L-` + zero-padded sequence (e.g. `L-00008`).
    pub number: String,

    // --- requester ---
    pub student_id: String,
    pub student_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    // --- leave details ---
    /// Trip date, `YYYY-MM-DD`.
    pub date: String,
    /// Planned out time, `HH:MM`.
    pub out_time: String,
    /// Expected return time, `HH:MM`.
    pub in_time: String,
    pub purpose: String,
    pub place: String,
    /// Opaque proof-document reference from the upload store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,

    // --- decision ---
    pub status: LocalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_note: Option<String>,

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

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Payload for creating a local leave record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLocalLeave {
    pub date: String,
    pub out_time: String,
    pub in_time: String,
    pub purpose: String,
    pub place: String,
    #[serde(default)]
    pub attachment: Option<String>,
}

/// Payload for the hostel office decision on a local record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDecideRequest {
    pub decision: LocalStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LocalLeave {
        LocalLeave {
            id: "abc".into(),
            number: "L-00008".into(),
            student_id: "s1".into(),
            student_name: "Asha".into(),
            department: Some("cse".into()),
            date: "2026-09-01".into(),
            out_time: "14:00".into(),
            in_time: "18:00".into(),
            purpose: "bank visit".into(),
            place: "city branch".into(),
            attachment: None,
            status: LocalStatus::Pending,
            decided_by: None,
            decided_at: None,
            decision_note: None,
            utilization_status: UtilizationStatus::Pending,
            exit_used: false,
            entry_used: false,
            actual_out_at: None,
            actual_in_at: None,
            created_at: "2026-08-23T10:00:00+00:00".into(),
        }
    }

    #[test]
    fn status_roundtrip() {
        for s in [LocalStatus::Pending, LocalStatus::Approved, LocalStatus::Denied] {
            assert_eq!(LocalStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(serde_json::to_string(&LocalStatus::Denied).unwrap(), "\"denied\"");
    }

    #[test]
    fn json_shape() {
        let v = serde_json::to_value(record()).unwrap();
        assert_eq!(v["number"], "L-00008");
        assert_eq!(v["utilizationStatus"], "pending");
        assert_eq!(v["exitUsed"], false);
        // Absent optionals are omitted, not null.
        assert!(v.get("decidedBy").is_none());
        assert!(v.get("actualOutAt").is_none());
    }

    #[test]
    fn json_roundtrip() {
        let r = record();
        let json = serde_json::to_string(&r).unwrap();
        let back: LocalLeave = serde_json::from_str(&json).unwrap();
        assert_eq!(back.number, r.number);
        assert_eq!(back.status, LocalStatus::Pending);
        assert_eq!(back.utilization_status, UtilizationStatus::Pending);
    }
}
