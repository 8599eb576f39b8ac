//! The durable relay queue trait.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trestle_primitives::{
    job::{JobPriority, QueueCounts, RelayJob},
    types::DepositId,
};

use crate::errors::DbResult;

/// Row id of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A job to enqueue.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// The deposit this job relays.
    pub deposit_id: DepositId,

    /// The relay payload, serialized into the row.
    pub payload: RelayJob,

    /// Scheduling tier.
    pub priority: JobPriority,

    /// Earliest time the job may be claimed.
    pub run_after: DateTime<Utc>,
}

/// A claimed job as handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    /// Queue row id, used to ack the job when the handler finishes.
    pub job_id: JobId,

    /// The deposit this job relays.
    pub deposit_id: DepositId,

    /// The relay payload.
    pub payload: RelayJob,

    /// Scheduling tier.
    pub priority: JobPriority,

    /// Number of times this job has been claimed, including the current claim.
    pub attempts: u32,

    /// When the job was first enqueued.
    pub enqueued_at: DateTime<Utc>,
}

/// Durable, priority-ordered work distribution for relay attempts.
///
/// Delivery is at-least-once: a crash between a claim and its ack re-delivers the
/// job after [`QueueDb::requeue_orphaned_jobs`] runs at the next startup. The relay
/// handler is idempotent against the deposit store, so re-delivery is safe.
#[async_trait]
pub trait QueueDb {
    /// Enqueues a job in the waiting state.
    async fn enqueue_job(&self, job: &NewJob) -> DbResult<JobId>;

    /// Atomically claims the next due job: the waiting entry with the highest
    /// priority, ties broken oldest first. Claiming marks the entry active and
    /// counts an attempt.
    async fn claim_next_job(&self, now: DateTime<Utc>) -> DbResult<Option<QueuedJob>>;

    /// Returns a claimed job to the waiting state for a later attempt, recording
    /// the handler error that caused it.
    async fn retry_job(&self, job_id: JobId, run_after: DateTime<Utc>, error: &str)
        -> DbResult<()>;

    /// Returns a claimed job to the waiting state without counting the claim as
    /// an attempt. Used when shutdown interrupts a handler mid-flight.
    async fn release_job(&self, job_id: JobId, run_after: DateTime<Utc>) -> DbResult<()>;

    /// Marks a claimed job as done.
    async fn complete_job(&self, job_id: JobId) -> DbResult<()>;

    /// Moves a claimed job to the dead set for operator inspection.
    async fn bury_job(&self, job_id: JobId, error: &str) -> DbResult<()>;

    /// Whether a waiting or active entry exists for this deposit.
    ///
    /// Used by startup recovery to spot pending deposits whose job was lost
    /// between the record insert and the enqueue.
    async fn has_live_job(&self, deposit_id: DepositId) -> DbResult<bool>;

    /// Snapshot of queue depth by state.
    async fn queue_counts(&self) -> DbResult<QueueCounts>;

    /// Flips every active entry back to waiting. Run once at startup, before any
    /// worker claims, to recover claims orphaned by a crash.
    async fn requeue_orphaned_jobs(&self, now: DateTime<Utc>) -> DbResult<u64>;
}
