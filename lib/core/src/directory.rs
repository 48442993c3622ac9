use serde::{Deserialize, Serialize};

use crate::actor::Role;

/// One entry in the identity directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Delivery address for notifications, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Read-only lookup of people and approver assignments.
///
/// The campus identity system is external; the services only need these
/// two queries from it. [`StaticDirectory`] is the reference
/// implementation, seeded from server configuration.
pub trait Directory: Send + Sync {
    /// Look up a person by id.
    fn resolve(&self, id: &str) -> Option<Person>;

    /// Find the approver holding `role`, scoped to `department` when the
    /// role is department-bound (ignored for campus-wide roles).
    fn find_approver(&self, role: Role, department: Option<&str>) -> Option<Person>;
}

/// In-memory directory over a fixed list of people.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    people: Vec<Person>,
}

impl StaticDirectory {
    pub fn new(people: Vec<Person>) -> Self {
        Self { people }
    }
}

impl Directory for StaticDirectory {
    fn resolve(&self, id: &str) -> Option<Person> {
        self.people.iter().find(|p| p.id == id).cloned()
    }

    fn find_approver(&self, role: Role, department: Option<&str>) -> Option<Person> {
        self.people
            .iter()
            .find(|p| {
                p.role == role
                    && match department {
                        Some(dept) => p.department.as_deref() == Some(dept),
                        None => true,
                    }
            })
            .cloned()
    }
}
