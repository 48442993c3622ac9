//! Server-side configuration.
//!
//! Loaded from `/etc/gatehouse/<name>.toml` (or a direct path). The
//! `[[people]]` tables double as the identity directory seed and the
//! login credential list.

use std::path::{Path, PathBuf};

use gatehouse_core::{Person, Role};
use serde::Deserialize;

/// Server configuration file.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub gate: GateSection,
    #[serde(default)]
    pub people: Vec<PersonConfig>,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the SQLite database.
    pub data_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_expire_secs")]
    pub expire_secs: u64,
}

/// `[gate]` section — crossing-token tuning.
#[derive(Debug, Deserialize)]
pub struct GateSection {
    /// Seconds a minted crossing token stays presentable.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

/// One `[[people]]` entry — a directory person plus optional login
/// credentials. Entries without a `password_hash` appear in the
/// directory (so they can approve and receive notices) but cannot
/// log in.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonConfig {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password_hash: Option<String>,
}

fn default_expire_secs() -> u64 {
    28800
}

fn default_token_ttl_secs() -> u64 {
    300
}

impl ServerConfig {
    /// Resolve a context name or path to a config file path.
    ///
    /// A bare name maps to `/etc/gatehouse/<name>.toml`; anything
    /// containing `/` or `.` is treated as a path.
    pub fn resolve_path(name_or_path: &str) -> PathBuf {
        if name_or_path.contains('/') || name_or_path.contains('.') {
            PathBuf::from(name_or_path)
        } else {
            PathBuf::from("/etc/gatehouse").join(format!("{}.toml", name_or_path))
        }
    }

    /// Load config from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", path.display(), e))?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find a configured person by id.
    pub fn find_person(&self, id: &str) -> Option<&PersonConfig> {
        self.people.iter().find(|p| p.id == id)
    }

    /// The directory seed derived from the `[[people]]` tables.
    pub fn directory_people(&self) -> Vec<Person> {
        self.people
            .iter()
            .map(|p| Person {
                id: p.id.clone(),
                name: p.name.clone(),
                role: p.role,
                department: p.department.clone(),
                email: p.email.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[storage]
data_dir = "/var/lib/gatehouse"

[jwt]
secret = "0123456789abcdef"

[gate]
token_ttl_secs = 120

[[people]]
id = "s1"
name = "Asha"
role = "student"
department = "cse"
password_hash = "$argon2id$dummy"

[[people]]
id = "dean-1"
name = "Dean SA"
role = "dean"
email = "dean@example.edu"
"#;

    #[test]
    fn test_parse_sample() {
        let config: ServerConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.storage.data_dir, "/var/lib/gatehouse");
        assert_eq!(config.jwt.expire_secs, 28800);
        assert_eq!(config.gate.token_ttl_secs, 120);
        assert_eq!(config.people.len(), 2);
        assert_eq!(config.people[0].role, Role::Student);
        assert!(config.people[1].password_hash.is_none());
    }

    #[test]
    fn test_gate_section_defaults() {
        let config: ServerConfig = toml::from_str(
            "[storage]\ndata_dir = \"/tmp\"\n[jwt]\nsecret = \"x\"\n",
        )
        .unwrap();
        assert_eq!(config.gate.token_ttl_secs, 300);
        assert!(config.people.is_empty());
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            ServerConfig::resolve_path("campus"),
            PathBuf::from("/etc/gatehouse/campus.toml")
        );
        assert_eq!(
            ServerConfig::resolve_path("./campus.toml"),
            PathBuf::from("./campus.toml")
        );
        assert_eq!(
            ServerConfig::resolve_path("/opt/gh/prod.toml"),
            PathBuf::from("/opt/gh/prod.toml")
        );
    }

    #[test]
    fn test_directory_people() {
        let config: ServerConfig = toml::from_str(SAMPLE).unwrap();
        let people = config.directory_people();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].id, "s1");
        assert_eq!(people[0].department.as_deref(), Some("cse"));
        assert_eq!(people[1].email.as_deref(), Some("dean@example.edu"));
    }

    #[test]
    fn test_find_person() {
        let config: ServerConfig = toml::from_str(SAMPLE).unwrap();
        assert!(config.find_person("s1").is_some());
        assert!(config.find_person("nobody").is_none());
    }

    #[test]
    fn test_persisted_role_names() {
        let err = toml::from_str::<ServerConfig>(
            "[storage]\ndata_dir = \"/tmp\"\n[jwt]\nsecret = \"x\"\n[[people]]\nid = \"h\"\nname = \"H\"\nrole = \"hostel_office\"\n",
        );
        assert!(err.is_err());
    }
}
