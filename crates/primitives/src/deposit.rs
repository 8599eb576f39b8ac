//! The deposit record and its status machine.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::{
    errors::ParseError,
    types::{Address, BlockHeight, DepositId, TxHash},
};

/// The asset being bridged, tagged so the execution path can match on it exhaustively.
///
/// The source contract encodes the native asset as the all-zero token address; that
/// sentinel is resolved into [`AssetKind::Native`] at ingestion and never leaks past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AssetKind {
    /// The source chain's native asset.
    Native,

    /// A token identified by its contract address on the source chain.
    Token(Address),
}

impl AssetKind {
    /// Resolves the wire representation of the token field.
    ///
    /// Both an absent token field and the zero-address sentinel denote the native asset.
    pub fn from_wire(token: Option<Address>) -> Self {
        match token {
            None => Self::Native,
            Some(addr) if addr.is_zero() => Self::Native,
            Some(addr) => Self::Token(addr),
        }
    }

    /// The token contract address, if this is a token deposit.
    pub fn token_address(&self) -> Option<Address> {
        match self {
            Self::Native => None,
            Self::Token(addr) => Some(*addr),
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Token(addr) => write!(f, "token({addr})"),
        }
    }
}

/// Processing status of a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    /// Observed and scheduled but not yet picked up by a worker.
    Pending,

    /// Claimed by a worker; confirmation wait, validation or execution is underway.
    Processing,

    /// Relayed to the destination chain, receipt confirmed.
    Completed,

    /// Terminally failed: either a permanent validation fault or the retry
    /// ceiling was exhausted. Only an admin retry can revive it.
    Failed,

    /// Withdrawn from the pipeline by an operator. Never set by the pipeline itself.
    Cancelled,
}

impl DepositStatus {
    /// Whether the automated pipeline is done with this deposit.
    ///
    /// A worker that finds a deposit in a final status skips it without touching it.
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };

        write!(f, "{s}")
    }
}

impl FromStr for DepositStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseError::InvalidStatus(other.to_owned())),
        }
    }
}

/// A fully materialized deposit record as held by the store.
///
/// `deposit_id` is immutable for the life of the record. Once the status reaches
/// [`DepositStatus::Completed`], `completed_tx_hash` and `completed_at` are set and
/// never cleared. `retry_count` only ever increases within a processing cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    /// The chain-assigned deposit id, the sole dedup key.
    pub deposit_id: DepositId,

    /// The depositing user on the source chain.
    pub user: Address,

    /// What is being bridged.
    pub asset: AssetKind,

    /// Deposited amount in the asset's smallest unit.
    pub amount: U256,

    /// Anti-replay tag emitted by the source contract, when present.
    pub nonce: Option<u64>,

    /// Hash of the source-chain transaction that emitted the deposit event.
    pub source_tx_hash: TxHash,

    /// Block in which the deposit event was emitted.
    pub source_block: BlockHeight,

    /// Source-chain timestamp of the deposit, unix seconds.
    pub source_timestamp: u64,

    /// Current processing status.
    pub status: DepositStatus,

    /// Number of deposit-level retry cycles scheduled so far.
    pub retry_count: u32,

    /// Human-readable reason for the most recent failure, if any.
    pub failure_reason: Option<String>,

    /// Destination-chain transaction hash, set exactly once on completion.
    pub completed_tx_hash: Option<TxHash>,

    /// When the relay completed.
    pub completed_at: Option<DateTime<Utc>>,

    /// When the record was first created by the monitor.
    pub created_at: DateTime<Utc>,
}

/// The insertable projection of a deposit, built by the monitor from a chain event.
///
/// The store fills in the processing-state columns (`status = pending`,
/// `retry_count = 0`) and the creation timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeposit {
    /// The chain-assigned deposit id.
    pub deposit_id: DepositId,

    /// The depositing user.
    pub user: Address,

    /// What is being bridged.
    pub asset: AssetKind,

    /// Deposited amount in the asset's smallest unit.
    pub amount: U256,

    /// Anti-replay tag emitted by the source contract, when present.
    pub nonce: Option<u64>,

    /// Hash of the emitting source transaction.
    pub source_tx_hash: TxHash,

    /// Block in which the event was emitted.
    pub source_block: BlockHeight,

    /// Source-chain timestamp, unix seconds.
    pub source_timestamp: u64,
}

/// A status move to apply to a deposit, produced by one of the constructors so
/// that every mutation site states its intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositTransition {
    to: DepositStatus,
    failure_reason: Option<String>,
    completed: Option<(TxHash, DateTime<Utc>)>,
    bump_retry: bool,
    reset_retry: bool,
}

impl DepositTransition {
    /// Claims the deposit for a relay attempt.
    pub fn processing() -> Self {
        Self {
            to: DepositStatus::Processing,
            failure_reason: None,
            completed: None,
            bump_retry: false,
            reset_retry: false,
        }
    }

    /// Records terminal success with the destination transaction hash.
    pub fn completed(tx_hash: TxHash, at: DateTime<Utc>) -> Self {
        Self {
            to: DepositStatus::Completed,
            failure_reason: None,
            completed: Some((tx_hash, at)),
            bump_retry: false,
            reset_retry: false,
        }
    }

    /// Schedules another attempt: back to pending with the retry counter bumped
    /// and the failure reason recorded.
    pub fn retry_pending(reason: impl Into<String>) -> Self {
        Self {
            to: DepositStatus::Pending,
            failure_reason: Some(reason.into()),
            completed: None,
            bump_retry: true,
            reset_retry: false,
        }
    }

    /// Records terminal failure. The retry counter is left untouched so that a
    /// permanent validation fault keeps it at zero.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            to: DepositStatus::Failed,
            failure_reason: Some(reason.into()),
            completed: None,
            bump_retry: false,
            reset_retry: false,
        }
    }

    /// Admin retry: a fresh processing cycle with the retry counter and failure
    /// reason cleared.
    pub fn pending_for_retry() -> Self {
        Self {
            to: DepositStatus::Pending,
            failure_reason: None,
            completed: None,
            bump_retry: false,
            reset_retry: true,
        }
    }

    /// Releases a claim without consuming a retry, e.g. when shutdown interrupts
    /// the confirmation wait.
    pub fn released() -> Self {
        Self {
            to: DepositStatus::Pending,
            failure_reason: None,
            completed: None,
            bump_retry: false,
            reset_retry: false,
        }
    }

    /// Admin cancellation.
    pub fn cancelled() -> Self {
        Self {
            to: DepositStatus::Cancelled,
            failure_reason: None,
            completed: None,
            bump_retry: false,
            reset_retry: false,
        }
    }

    /// The target status.
    pub const fn to(&self) -> DepositStatus {
        self.to
    }

    /// The failure reason to record, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// The completion pair to record, if any.
    pub const fn completion(&self) -> Option<(TxHash, DateTime<Utc>)> {
        self.completed
    }

    /// Whether the retry counter is incremented by this move.
    pub const fn bumps_retry(&self) -> bool {
        self.bump_retry
    }

    /// Whether the retry counter is reset to zero by this move.
    pub const fn resets_retry(&self) -> bool {
        self.reset_retry
    }
}

/// Aggregate counts over all deposits, plus the total successfully bridged volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepositStats {
    /// Deposits currently pending.
    pub pending: u64,

    /// Deposits currently being processed.
    pub processing: u64,

    /// Deposits relayed successfully.
    pub completed: u64,

    /// Deposits terminally failed.
    pub failed: u64,

    /// Deposits cancelled by an operator.
    pub cancelled: u64,

    /// Sum of the amounts of all completed deposits.
    pub completed_volume: U256,
}

impl DepositStats {
    /// Total number of deposits ever observed.
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed + self.cancelled
    }
}

/// A pagination window for listing queries, zero-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based page number.
    pub number: u64,

    /// Number of records per page.
    pub size: u64,
}

impl Page {
    /// The page size used when a caller does not specify one.
    pub const DEFAULT_SIZE: u64 = 50;

    /// Creates a page, clamping the size to something sane.
    pub fn new(number: u64, size: u64) -> Self {
        let size = if size == 0 { Self::DEFAULT_SIZE } else { size };

        Self { number, size }
    }

    /// The row offset this page starts at.
    pub const fn offset(&self) -> u64 {
        self.number * self.size
    }
}
