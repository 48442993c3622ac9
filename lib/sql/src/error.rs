use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlError {
    #[error("query error: {0}")]
    Query(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("connection error: {0}")]
    Connection(String),
}

impl SqlError {
    /// Whether this error came from a violated UNIQUE constraint.
    ///
    /// Stores use this to turn a duplicate insert into a domain-level
    /// conflict instead of a storage failure.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            SqlError::Query(m) | SqlError::Execution(m) => m.contains("UNIQUE constraint"),
            SqlError::Connection(_) => false,
        }
    }
}
