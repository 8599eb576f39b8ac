//! Top-level error type for the relay pipeline.

use thiserror::Error;
use trestle_chain::errors::ClientError;
use trestle_db::errors::DbError;

/// A fault that aborts the current pipeline step.
///
/// Worker handlers let these bubble up so that the queue's redelivery policy
/// decides what happens next; they are distinct from deposit-level failures,
/// which are recorded on the deposit record instead.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The store rejected or failed an operation.
    #[error("store: {0}")]
    Db(#[from] DbError),

    /// A chain client call failed.
    #[error("chain client: {0}")]
    Client(#[from] ClientError),
}

/// Result type for pipeline operations.
pub type RelayResult<T> = Result<T, RelayError>;
