//! Errors for parsing the primitive types from their string encodings.

use thiserror::Error;

/// Error while parsing one of the primitive types from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The supplied string is not a valid 20-byte hex address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The supplied string is not a valid 32-byte hex transaction hash.
    #[error("invalid transaction hash: {0}")]
    InvalidTxHash(String),

    /// The supplied string is not a valid base-10 unsigned 256-bit integer.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The supplied string does not name a deposit status.
    #[error("invalid deposit status: {0}")]
    InvalidStatus(String),

    /// The supplied value does not name a job priority tier.
    #[error("invalid job priority: {0}")]
    InvalidPriority(i64),

    /// The supplied string does not name a queue job state.
    #[error("invalid job state: {0}")]
    InvalidJobState(String),
}
