//! Error types for the reading store.

use hive_core::StorageError;
use thiserror::Error;

/// Errors raised by the `SQLite` store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },

    /// The blocking task running a query panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(String),

    /// A stored timestamp is outside the representable range.
    #[error("stored timestamp out of range: {0}us")]
    InvalidTimestamp(i64),

    /// A stored device key no longer passes validation.
    #[error("stored device key is invalid: {0}")]
    InvalidKey(String),
}

/// Convenience alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for StorageError {
    fn from(err: StoreError) -> Self {
        let detail = err.to_string();
        match err {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => match e.code {
                rusqlite::ErrorCode::DatabaseBusy
                | rusqlite::ErrorCode::DatabaseLocked
                | rusqlite::ErrorCode::CannotOpen
                | rusqlite::ErrorCode::SystemIoFailure
                | rusqlite::ErrorCode::DiskFull => Self::Unavailable(detail),
                rusqlite::ErrorCode::ConstraintViolation => Self::Constraint(detail),
                _ => Self::Internal(detail),
            },
            StoreError::Pool(_) => Self::Unavailable(detail),
            StoreError::InvalidTimestamp(_) | StoreError::InvalidKey(_) => Self::Corrupt(detail),
            StoreError::Sqlite(_) | StoreError::Migration { .. } | StoreError::Join(_) => {
                Self::Internal(detail)
            }
        }
    }
}
