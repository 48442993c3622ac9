//! Crossing-code generation and verification.
//!
//! A code is a 256-bit random secret, base64url-encoded, optionally
//! suffixed with the bound record number as `"|GP:" + number`. Only
//! the SHA-256 of the secret is stored; a scanned code is split on the
//! separator and the base secret re-hashed for lookup.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

const SECRET_BYTES: usize = 32;
const RECORD_SEPARATOR: &str = "|GP:";

/// Mint a fresh secret. Returns `(secret, hash)`; the secret goes to
/// the student, the hash to storage.
pub fn mint() -> (String, String) {
    let mut buf = [0u8; SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    let secret = URL_SAFE_NO_PAD.encode(buf);
    let digest = hash(&secret);
    (secret, digest)
}

/// SHA-256 of the secret string, lowercase hex.
pub fn hash(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

/// Build the presented form of a code.
pub fn compose(secret: &str, record_number: Option<&str>) -> String {
    match record_number {
        Some(number) => format!("{secret}{RECORD_SEPARATOR}{number}"),
        None => secret.to_string(),
    }
}

/// Split a presented code into its secret and any record-number suffix.
pub fn split(presented: &str) -> (&str, Option<&str>) {
    match presented.split_once(RECORD_SEPARATOR) {
        Some((secret, number)) if !number.is_empty() => (secret, Some(number)),
        Some((secret, _)) => (secret, None),
        None => (presented, None),
    }
}
