//! This module contains the models for the database tables.
//!
//! Rows carry the raw column encodings; the `into_*` conversions parse them into
//! the typed primitives and report anything malformed as a conversion error
//! instead of panicking.

use chrono::{DateTime, Utc};
use trestle_primitives::{
    amount,
    deposit::{AssetKind, Deposit},
    job::{JobPriority, RelayJob},
    types::{DepositId, TxHash},
};

use super::errors::StorageError;
use crate::queue::{JobId, QueuedJob};

/// The model for a deposit record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct DepositRow {
    /// The chain-assigned deposit id stored as `INTEGER`.
    pub(super) deposit_id: i64,

    /// The hex-serialized user address stored as `TEXT`.
    pub(super) user_address: String,

    /// The hex-serialized token address stored as `TEXT`, `NULL` for the native
    /// asset.
    pub(super) token_address: Option<String>,

    /// The amount stored as a base-10 `TEXT` string.
    pub(super) amount: String,

    /// The contract-emitted anti-replay tag stored as `INTEGER`.
    pub(super) nonce: Option<i64>,

    /// The hex-serialized source transaction hash stored as `TEXT`.
    pub(super) source_tx_hash: String,

    /// The source block number stored as `INTEGER`.
    pub(super) source_block: i64,

    /// The source timestamp stored as unix seconds in `INTEGER`.
    pub(super) source_timestamp: i64,

    /// The status name stored as `TEXT`.
    pub(super) status: String,

    /// The retry cycle counter stored as `INTEGER`.
    pub(super) retry_count: i64,

    /// The last failure reason stored as `TEXT`.
    pub(super) failure_reason: Option<String>,

    /// The hex-serialized destination transaction hash stored as `TEXT`.
    pub(super) completed_tx_hash: Option<String>,

    /// The completion time stored as unix seconds in `INTEGER`.
    pub(super) completed_at: Option<i64>,

    /// The creation time stored as unix seconds in `INTEGER`.
    pub(super) created_at: i64,
}

impl DepositRow {
    /// Parses the raw row into a typed [`Deposit`].
    pub(super) fn into_deposit(self) -> Result<Deposit, StorageError> {
        let user = self
            .user_address
            .parse()
            .map_err(|e| StorageError::MismatchedTypes(format!("user_address: {e}")))?;

        let asset = match self.token_address {
            None => AssetKind::Native,
            Some(raw) => AssetKind::Token(
                raw.parse()
                    .map_err(|e| StorageError::MismatchedTypes(format!("token_address: {e}")))?,
            ),
        };

        let amount = amount::parse_decimal(&self.amount)
            .map_err(|e| StorageError::MismatchedTypes(format!("amount: {e}")))?;

        let source_tx_hash = self
            .source_tx_hash
            .parse()
            .map_err(|e| StorageError::MismatchedTypes(format!("source_tx_hash: {e}")))?;

        let status = self
            .status
            .parse()
            .map_err(|e| StorageError::MismatchedTypes(format!("status: {e}")))?;

        let completed_tx_hash = self
            .completed_tx_hash
            .map(|raw| {
                raw.parse::<TxHash>()
                    .map_err(|e| StorageError::MismatchedTypes(format!("completed_tx_hash: {e}")))
            })
            .transpose()?;

        let completed_at = self.completed_at.map(timestamp_from_secs).transpose()?;

        Ok(Deposit {
            deposit_id: DepositId(to_u64(self.deposit_id, "deposit_id")?),
            user,
            asset,
            amount,
            nonce: self.nonce.map(|n| to_u64(n, "nonce")).transpose()?,
            source_tx_hash,
            source_block: to_u64(self.source_block, "source_block")?,
            source_timestamp: to_u64(self.source_timestamp, "source_timestamp")?,
            status,
            retry_count: self.retry_count.try_into().map_err(|_| {
                StorageError::MismatchedTypes(format!("retry_count: {}", self.retry_count))
            })?,
            failure_reason: self.failure_reason,
            completed_tx_hash,
            completed_at,
            created_at: timestamp_from_secs(self.created_at)?,
        })
    }
}

/// The model for a relay queue entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct JobRow {
    /// The queue row id stored as `INTEGER`.
    pub(super) job_id: i64,

    /// The deposit id this entry relays, stored as `INTEGER`.
    pub(super) deposit_id: i64,

    /// The JSON-serialized [`RelayJob`] payload stored as `TEXT`.
    pub(super) payload: String,

    /// The priority tier stored as `INTEGER`.
    pub(super) priority: i64,

    /// The claim counter stored as `INTEGER`.
    pub(super) attempts: i64,

    /// The enqueue time stored as unix milliseconds in `INTEGER`.
    pub(super) enqueued_at: i64,
}

impl JobRow {
    /// Parses the raw row into a typed [`QueuedJob`].
    pub(super) fn into_queued_job(self) -> Result<QueuedJob, StorageError> {
        let payload: RelayJob = serde_json::from_str(&self.payload)
            .map_err(|e| StorageError::MismatchedTypes(format!("payload: {e}")))?;

        let priority = JobPriority::from_i64(self.priority)
            .map_err(|e| StorageError::MismatchedTypes(format!("priority: {e}")))?;

        Ok(QueuedJob {
            job_id: JobId(self.job_id),
            deposit_id: DepositId(to_u64(self.deposit_id, "deposit_id")?),
            payload,
            priority,
            attempts: self.attempts.try_into().map_err(|_| {
                StorageError::MismatchedTypes(format!("attempts: {}", self.attempts))
            })?,
            enqueued_at: timestamp_from_millis(self.enqueued_at)?,
        })
    }
}

pub(super) fn to_u64(value: i64, column: &str) -> Result<u64, StorageError> {
    u64::try_from(value).map_err(|_| StorageError::MismatchedTypes(format!("{column}: {value}")))
}

pub(super) fn to_i64(value: u64, column: &str) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::InvalidData(format!("{column}: {value}")))
}

pub(super) fn timestamp_from_secs(secs: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StorageError::MismatchedTypes(format!("timestamp: {secs}")))
}

pub(super) fn timestamp_from_millis(millis: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::MismatchedTypes(format!("timestamp: {millis}")))
}
