//! Errors reported across the pipeline seams.

use thiserror::Error;

/// Failure reported by a [`ReadingStore`](crate::ReadingStore) or
/// [`DeviceRegistry`](crate::DeviceRegistry) implementation.
///
/// Every variant is non-fatal to the pipeline: callers log it and continue.
#[derive(Clone, Debug, Error)]
pub enum StorageError {
    /// Backend could not be reached (pool exhausted, file locked, I/O).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// A write violated a schema constraint.
    #[error("constraint violation: {0}")]
    Constraint(String),
    /// Stored data could not be decoded back into a value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// Anything else (panicked blocking task, poisoned state).
    #[error("internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Constraint(_) => "constraint",
            Self::Corrupt(_) => "corrupt",
            Self::Internal(_) => "internal",
        }
    }
}
