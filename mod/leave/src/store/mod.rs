pub mod local;
pub mod outstation;

pub use local::LocalStore;
pub use outstation::OutstationStore;

use gatehouse_core::ServiceError;
use gatehouse_sql::SqlStore;

/// Shared counter table backing record-number allocation for both
/// record kinds.
pub(crate) const COUNTER_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS leave_counters (
    prefix TEXT PRIMARY KEY,
    next   INTEGER NOT NULL
)";

/// Allocate the next sequence value for a record-number prefix.
///
/// A single upsert with RETURNING, so two concurrent creates can never
/// observe the same value.
pub(crate) fn next_sequence(db: &dyn SqlStore, prefix: &str) -> Result<i64, ServiceError> {
    let rows = db
        .query(
            "INSERT INTO leave_counters (prefix, next) VALUES (?1, 1) \
             ON CONFLICT(prefix) DO UPDATE SET next = next + 1 \
             RETURNING next",
            &[prefix.into()],
        )
        .map_err(|e| ServiceError::Storage(e.to_string()))?;

    rows.first()
        .and_then(|r| r.get_i64("next"))
        .ok_or_else(|| ServiceError::Storage(format!("counter for {prefix} returned no value")))
}
