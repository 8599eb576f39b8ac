//! Top-level error type for the persistence layer.

use thiserror::Error;

use crate::persistent::errors::StorageError;

/// Unified error for all store operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// The SQLite backend failed.
    #[error("sqlite: {0}")]
    Storage(#[from] StorageError),
}

impl DbError {
    /// Whether retrying the same operation can reasonably succeed.
    ///
    /// Busy/locked and pool-level faults clear on their own; everything else
    /// (constraint violations, corrupt rows) will not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(StorageError::Driver(err)) => match err {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db_err) => {
                    let msg = db_err.message();

                    msg.contains("locked") || msg.contains("busy")
                }
                _ => false,
            },
            Self::Storage(_) => false,
        }
    }
}

/// Result type for all store operations.
pub type DbResult<T> = Result<T, DbError>;
