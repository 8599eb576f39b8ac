//! Types for the RPC server.

use ethnum::U256;
use serde::{Deserialize, Serialize};
use trestle_primitives::{
    deposit::{AssetKind, Deposit, DepositStats, DepositStatus},
    job::QueueCounts,
    types::{Address, BlockHeight, TxHash},
};

/// A deposit record as served over the monitoring surface.
///
/// Timestamps are unix seconds and amounts are base-10 strings, so the payload
/// survives json tooling that mangles integers wider than 53 bits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcDeposit {
    /// The chain-assigned deposit id.
    pub deposit_id: u64,

    /// The depositing user on the source chain.
    pub user: Address,

    /// What is being bridged.
    pub asset: AssetKind,

    /// Deposited amount in the asset's smallest unit.
    #[serde(with = "trestle_primitives::amount::dec_str")]
    pub amount: U256,

    /// Hash of the source transaction that emitted the deposit event.
    pub source_tx_hash: TxHash,

    /// Block in which the deposit event was emitted.
    pub source_block: BlockHeight,

    /// Source-chain timestamp of the deposit, unix seconds.
    pub source_timestamp: u64,

    /// Current processing status.
    pub status: DepositStatus,

    /// Retry cycles scheduled within the current processing cycle.
    pub retry_count: u32,

    /// Reason for the most recent failure, if any.
    pub failure_reason: Option<String>,

    /// Destination transaction hash, set once the relay completes.
    pub completed_tx_hash: Option<TxHash>,

    /// When the relay completed, unix seconds.
    pub completed_at: Option<i64>,

    /// When the monitor first recorded the deposit, unix seconds.
    pub created_at: i64,
}

impl From<Deposit> for RpcDeposit {
    fn from(deposit: Deposit) -> Self {
        Self {
            deposit_id: deposit.deposit_id.value(),
            user: deposit.user,
            asset: deposit.asset,
            amount: deposit.amount,
            source_tx_hash: deposit.source_tx_hash,
            source_block: deposit.source_block,
            source_timestamp: deposit.source_timestamp,
            status: deposit.status,
            retry_count: deposit.retry_count,
            failure_reason: deposit.failure_reason,
            completed_tx_hash: deposit.completed_tx_hash,
            completed_at: deposit.completed_at.map(|at| at.timestamp()),
            created_at: deposit.created_at.timestamp(),
        }
    }
}

/// One page of a user's deposit history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcDepositPage {
    /// The deposits on this page, newest first.
    pub deposits: Vec<RpcDeposit>,

    /// Zero-based page number that was served.
    pub page: u64,

    /// Page size that was applied.
    pub page_size: u64,
}

/// Aggregate statistics over every deposit the relay has ever observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcBridgeStats {
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

    /// Total number of deposits ever observed.
    pub total: u64,

    /// Sum of the amounts of all completed deposits.
    #[serde(with = "trestle_primitives::amount::dec_str")]
    pub completed_volume: U256,

    /// Highest source block the monitor has seen a deposit event in.
    pub last_observed_block: BlockHeight,
}

impl RpcBridgeStats {
    /// Combines store statistics with the monitor's view of the source chain.
    pub fn new(stats: &DepositStats, last_observed_block: BlockHeight) -> Self {
        Self {
            pending: stats.pending,
            processing: stats.processing,
            completed: stats.completed,
            failed: stats.failed,
            cancelled: stats.cancelled,
            total: stats.total(),
            completed_volume: stats.completed_volume,
            last_observed_block,
        }
    }
}

/// A snapshot of the durable job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcQueueCounts {
    /// Jobs waiting to be claimed.
    pub waiting: u64,

    /// Jobs currently held by workers.
    pub active: u64,

    /// Jobs whose handler finished.
    pub completed: u64,

    /// Jobs buried after exhausting the attempt ceiling.
    pub dead: u64,
}

impl From<QueueCounts> for RpcQueueCounts {
    fn from(counts: QueueCounts) -> Self {
        Self {
            waiting: counts.waiting,
            active: counts.active,
            completed: counts.completed,
            dead: counts.dead,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use trestle_primitives::types::DepositId;

    use super::*;

    fn sample_deposit() -> Deposit {
        Deposit {
            deposit_id: DepositId(7),
            user: Address::new([0x11; 20]),
            asset: AssetKind::Native,
            amount: U256::new(1_000_000_000_000_000_000),
            nonce: Some(7),
            source_tx_hash: TxHash::new([0x22; 32]),
            source_block: 100,
            source_timestamp: 1_700_000_000,
            status: DepositStatus::Completed,
            retry_count: 1,
            failure_reason: None,
            completed_tx_hash: Some(TxHash::new([0x33; 32])),
            completed_at: Utc.timestamp_opt(1_700_000_200, 0).single(),
            created_at: Utc
                .timestamp_opt(1_700_000_100, 0)
                .single()
                .expect("must be a valid timestamp"),
        }
    }

    #[test]
    fn deposit_projects_to_unix_seconds_and_decimal_strings() {
        let rpc: RpcDeposit = sample_deposit().into();
        assert_eq!(rpc.deposit_id, 7);
        assert_eq!(rpc.created_at, 1_700_000_100);
        assert_eq!(rpc.completed_at, Some(1_700_000_200));

        let encoded = serde_json::to_value(&rpc).expect("must serialize");
        assert_eq!(encoded["amount"], json!("1000000000000000000"));
        assert_eq!(encoded["status"], json!("completed"));
        assert_eq!(encoded["asset"], json!({ "type": "native" }));

        let decoded: RpcDeposit =
            serde_json::from_value(encoded).expect("must deserialize its own output");
        assert_eq!(decoded.amount, rpc.amount);
        assert_eq!(decoded.completed_tx_hash, rpc.completed_tx_hash);
    }

    #[test]
    fn bridge_stats_totals_and_preserves_wide_volumes() {
        let volume = U256::from(u128::MAX);
        let stats = DepositStats {
            pending: 1,
            processing: 2,
            completed: 3,
            failed: 4,
            cancelled: 5,
            completed_volume: volume,
        };

        let rpc = RpcBridgeStats::new(&stats, 512);
        assert_eq!(rpc.total, 15);
        assert_eq!(rpc.last_observed_block, 512);

        let encoded = serde_json::to_value(&rpc).expect("must serialize");
        assert_eq!(encoded["completed_volume"], json!(volume.to_string()));
    }
}
