//! Bootstrap — start-up configuration checks and credential hashing.
//!
//! When gatehoused starts:
//! 1. Verify the config has a JWT secret and a data directory.
//! 2. Verify the people seed is usable (non-empty, unique ids).

use crate::config::ServerConfig;

/// Verify server configuration is ready for production use.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.jwt.secret.is_empty() {
        anyhow::bail!("JWT secret is empty in configuration.");
    }
    if config.storage.data_dir.is_empty() {
        anyhow::bail!("Storage data_dir is empty in configuration.");
    }
    if config.people.is_empty() {
        anyhow::bail!(
            "No [[people]] entries in configuration.\n\
             The server needs at least one person to authenticate."
        );
    }
    for (i, person) in config.people.iter().enumerate() {
        if person.id.is_empty() {
            anyhow::bail!("people[{}] has an empty id.", i);
        }
        if config.people.iter().filter(|p| p.id == person.id).count() > 1 {
            anyhow::bail!("Duplicate person id '{}' in configuration.", person.id);
        }
    }
    Ok(())
}

/// Verify a login attempt against a stored argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::Argon2;
    use password_hash::PasswordHash;
    use password_hash::PasswordVerifier;

    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

/// Hash a password for a `[[people]]` entry (the `hash-password` command).
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    use argon2::Argon2;
    use password_hash::rand_core::OsRng;
    use password_hash::{PasswordHasher, SaltString};

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}
