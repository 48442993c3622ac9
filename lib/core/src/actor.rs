use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The role a principal acts under.
///
/// Students request leaves and crossings, guards decide crossings, and
/// the remaining seven roles form the approval chain for leave records.
/// The string forms are persisted (JWT claims, directory seed, decision
/// records) and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Student,
    Guard,
    Instructor,
    OfficeSecretary,
    Dpgc,
    Dugc,
    Hod,
    Dean,
    HostelOffice,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Guard => "guard",
            Self::Instructor => "instructor",
            Self::OfficeSecretary => "officeSecretary",
            Self::Dpgc => "dpgc",
            Self::Dugc => "dugc",
            Self::Hod => "hod",
            Self::Dean => "dean",
            Self::HostelOffice => "hostelOffice",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Self::Student),
            "guard" => Some(Self::Guard),
            "instructor" => Some(Self::Instructor),
            "officeSecretary" => Some(Self::OfficeSecretary),
            "dpgc" => Some(Self::Dpgc),
            "dugc" => Some(Self::Dugc),
            "hod" => Some(Self::Hod),
            "dean" => Some(Self::Dean),
            "hostelOffice" => Some(Self::HostelOffice),
            _ => None,
        }
    }

    /// Whether this role sits somewhere in the leave approval chain.
    pub fn is_approver(&self) -> bool {
        !matches!(self, Self::Student | Self::Guard)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Actor — the authenticated principal
// ---------------------------------------------------------------------------

/// The authenticated principal behind a request.
///
/// Built from verified JWT claims by the auth middleware and injected
/// into request extensions; handlers extract it and pass it to services
/// for every ownership/authorization check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
    /// Department the actor belongs to. `None` for roles with campus-wide
    /// scope (guard, dean, hostelOffice).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl Actor {
    pub fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }
}
