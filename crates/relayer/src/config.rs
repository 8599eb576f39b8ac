//! Tuning knobs for the pipeline tasks.
//!
//! Unlike the bridge parameters, none of these affect what ends up on chain;
//! they only shape how eagerly the process polls, reconnects and redelivers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the deposit event monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// How many blocks behind the current head each (re)connect rescans.
    ///
    /// Events older than this window that were missed while offline are only
    /// picked up by a manual backfill.
    pub backfill_window: u64,

    /// Largest inclusive block span a single history query may cover.
    pub chunk_size: u64,

    /// Delay before the first reconnect attempt after the feed drops.
    pub reconnect_base_delay: Duration,

    /// Ceiling on the reconnect delay as consecutive attempts keep failing.
    pub reconnect_max_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backfill_window: 100,
            chunk_size: 50,
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(60),
        }
    }
}

/// Settings for the relay worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent relay workers.
    pub workers: usize,

    /// Pause between claim attempts while the queue is empty.
    pub poll_interval: Duration,

    /// Pause between head re-checks while a deposit waits for confirmations.
    pub confirmation_poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(500),
            confirmation_poll_interval: Duration::from_secs(5),
        }
    }
}

/// Redelivery policy for jobs whose handler errored.
///
/// This budget covers infrastructure faults (store or RPC errors) and is
/// independent of the deposit-level retry counter, which only execution
/// failures consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRetryConfig {
    /// Deliveries a job may consume before it is buried in the dead set.
    pub max_attempts: u32,

    /// Delay before the first redelivery; doubles per consumed attempt.
    pub base_delay: Duration,
}

impl QueueRetryConfig {
    /// Redelivery delay after `attempts` deliveries have already failed,
    /// doubling from the base with a clamped exponent.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);

        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for QueueRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
        }
    }
}
