//! The queue payload driving one relay attempt, and its scheduling metadata.

use std::{fmt, str::FromStr};

use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::{
    deposit::{AssetKind, Deposit, NewDeposit},
    errors::ParseError,
    types::{Address, BlockHeight, DepositId, TxHash},
};

/// The denormalized projection of a deposit that a worker needs to run one relay
/// attempt without re-reading the store.
///
/// Scheduling aid only: the deposit record stays the source of truth, and a job can
/// be re-derived from it at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayJob {
    /// The deposit this job relays.
    pub deposit_id: DepositId,

    /// The depositing user, also the recipient on the destination chain.
    pub user: Address,

    /// What is being bridged.
    pub asset: AssetKind,

    /// Deposited amount in the asset's smallest unit.
    #[serde(with = "crate::amount::dec_str")]
    pub amount: U256,

    /// Hash of the emitting source transaction.
    pub source_tx_hash: TxHash,

    /// Block in which the deposit event was emitted; the confirmation gate counts
    /// from here.
    pub source_block: BlockHeight,
}

impl From<&NewDeposit> for RelayJob {
    fn from(deposit: &NewDeposit) -> Self {
        Self {
            deposit_id: deposit.deposit_id,
            user: deposit.user,
            asset: deposit.asset,
            amount: deposit.amount,
            source_tx_hash: deposit.source_tx_hash,
            source_block: deposit.source_block,
        }
    }
}

impl From<&Deposit> for RelayJob {
    fn from(deposit: &Deposit) -> Self {
        Self {
            deposit_id: deposit.deposit_id,
            user: deposit.user,
            asset: deposit.asset,
            amount: deposit.amount,
            source_tx_hash: deposit.source_tx_hash,
            source_block: deposit.source_block,
        }
    }
}

/// Coarse scheduling tier derived from the deposit amount.
///
/// Larger deposits are served first. Best-effort fairness only; correctness never
/// depends on ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    /// Everything below the medium tier threshold.
    Default,

    /// Mid-sized deposits.
    Medium,

    /// Large deposits, served before everything else.
    Large,
}

impl JobPriority {
    /// The integer encoding stored in the queue table. Higher sorts first.
    pub const fn as_i64(&self) -> i64 {
        match self {
            Self::Default => 0,
            Self::Medium => 1,
            Self::Large => 2,
        }
    }

    /// Decodes the stored integer representation.
    pub const fn from_i64(value: i64) -> Result<Self, ParseError> {
        match value {
            0 => Ok(Self::Default),
            1 => Ok(Self::Medium),
            2 => Ok(Self::Large),
            other => Err(ParseError::InvalidPriority(other)),
        }
    }
}

/// Lifecycle state of a queue row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Enqueued and claimable once its `run_after` time passes.
    Waiting,

    /// Claimed by a worker.
    Active,

    /// Handler finished; kept for the queue depth snapshot.
    Completed,

    /// Handler errored past the attempt ceiling; kept for operator inspection.
    Dead,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Dead => "dead",
        };

        write!(f, "{s}")
    }
}

impl FromStr for JobState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "dead" => Ok(Self::Dead),
            other => Err(ParseError::InvalidJobState(other.to_owned())),
        }
    }
}

/// Snapshot of queue depth by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Jobs waiting to be claimed.
    pub waiting: u64,

    /// Jobs currently held by workers.
    pub active: u64,

    /// Jobs whose handler finished.
    pub completed: u64,

    /// Jobs buried after exhausting the attempt ceiling.
    pub dead: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_prefers_large() {
        assert!(JobPriority::Large > JobPriority::Medium);
        assert!(JobPriority::Medium > JobPriority::Default);
        assert!(JobPriority::Large.as_i64() > JobPriority::Default.as_i64());
    }

    #[test]
    fn priority_integer_encoding_roundtrips() {
        for priority in [JobPriority::Default, JobPriority::Medium, JobPriority::Large] {
            assert_eq!(JobPriority::from_i64(priority.as_i64()), Ok(priority));
        }

        assert!(JobPriority::from_i64(9).is_err());
    }

    #[test]
    fn job_state_roundtrips_through_strings() {
        for state in [
            JobState::Waiting,
            JobState::Active,
            JobState::Completed,
            JobState::Dead,
        ] {
            let parsed: JobState = state.to_string().parse().expect("must parse back");
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn relay_job_serde_roundtrips() {
        let job = RelayJob {
            deposit_id: DepositId(9),
            user: "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
                .parse()
                .expect("must parse"),
            asset: AssetKind::Token(
                "0x00000000000000000000000000000000000000cc"
                    .parse()
                    .expect("must parse"),
            ),
            amount: U256::new(5_000),
            source_tx_hash: TxHash::new([9u8; 32]),
            source_block: 12,
        };

        let encoded = serde_json::to_string(&job).expect("must serialize");
        let decoded: RelayJob = serde_json::from_str(&encoded).expect("must deserialize");

        assert_eq!(decoded, job);
    }
}
