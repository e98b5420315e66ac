use thiserror::Error;

/// Typed error hierarchy for every result-store operation.
///
/// Callers can match on the variant that matters to them (a pipeline
/// retrying on `NotFound` vs. surfacing `Validation` to the user)
/// while everything still propagates with `?`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed or out-of-range input rejected at the write boundary.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced podcast or analysis does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A status move outside the allowed monotonic transitions.
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    /// Constraint violation surfaced by SQLite (duplicate key,
    /// would-be orphan). Should be unreachable through the public
    /// API, but never swallowed when it happens.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Validation(e.to_string())
    }
}
