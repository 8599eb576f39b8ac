//! Scheduling facade over the durable queue: priority classification on the
//! way in, the redelivery policy on the way out.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tracing::warn;
use trestle_bridge_params::tiers::PriorityTiers;
use trestle_db::{
    errors::DbResult,
    queue::{JobId, NewJob, QueueDb, QueuedJob},
};
use trestle_primitives::{
    job::{QueueCounts, RelayJob},
    types::DepositId,
};

use crate::config::QueueRetryConfig;

/// What became of a job after its handler errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    /// The job goes back to waiting and will be redelivered.
    Requeued {
        /// How long the job stays invisible before redelivery.
        delay: Duration,
    },

    /// The job exhausted its delivery budget and moved to the dead set.
    Buried,
}

/// Handle for scheduling and acknowledging relay jobs.
///
/// Wraps the durable store with the two policies the store itself does not
/// know about: which priority tier a payload lands in, and when a failing job
/// is given up on.
#[derive(Debug)]
pub struct JobQueue<Q> {
    store: Arc<Q>,
    tiers: PriorityTiers,
    retry: QueueRetryConfig,
}

impl<Q> Clone for JobQueue<Q> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tiers: self.tiers,
            retry: self.retry,
        }
    }
}

impl<Q: QueueDb> JobQueue<Q> {
    /// Creates a queue handle over `store`.
    pub fn new(store: Arc<Q>, tiers: PriorityTiers, retry: QueueRetryConfig) -> Self {
        Self {
            store,
            tiers,
            retry,
        }
    }

    /// Schedules a relay job for delivery once `delay` has passed.
    pub async fn enqueue_delayed(&self, payload: RelayJob, delay: Duration) -> DbResult<JobId> {
        let job = NewJob {
            deposit_id: payload.deposit_id,
            priority: self.tiers.classify(payload.amount),
            run_after: run_after_from(delay),
            payload,
        };

        self.store.enqueue_job(&job).await
    }

    /// Schedules a relay job for immediate delivery.
    pub async fn enqueue_now(&self, payload: RelayJob) -> DbResult<JobId> {
        self.enqueue_delayed(payload, Duration::ZERO).await
    }

    /// Claims the next due job, if any.
    pub async fn claim(&self) -> DbResult<Option<QueuedJob>> {
        self.store.claim_next_job(Utc::now()).await
    }

    /// Acknowledges a finished job.
    pub async fn complete(&self, job_id: JobId) -> DbResult<()> {
        self.store.complete_job(job_id).await
    }

    /// Returns an interrupted job to waiting without counting the delivery.
    pub async fn release(&self, job_id: JobId) -> DbResult<()> {
        self.store.release_job(job_id, Utc::now()).await
    }

    /// Applies the redelivery policy to a job whose handler errored: requeues
    /// with backoff while the delivery budget lasts, buries it after.
    pub async fn retry_or_bury(&self, job: &QueuedJob, error: &str) -> DbResult<JobDisposition> {
        if job.attempts >= self.retry.max_attempts {
            self.store.bury_job(job.job_id, error).await?;
            warn!(
                job_id = %job.job_id,
                deposit_id = job.deposit_id.value(),
                attempts = job.attempts,
                error,
                "job exhausted its delivery budget; burying"
            );

            return Ok(JobDisposition::Buried);
        }

        let delay = self.retry.backoff(job.attempts);
        self.store
            .retry_job(job.job_id, run_after_from(delay), error)
            .await?;

        Ok(JobDisposition::Requeued { delay })
    }

    /// Whether a waiting or active job exists for this deposit.
    pub async fn has_live_job(&self, deposit_id: DepositId) -> DbResult<bool> {
        self.store.has_live_job(deposit_id).await
    }

    /// Snapshot of queue depth by state.
    pub async fn counts(&self) -> DbResult<QueueCounts> {
        self.store.queue_counts().await
    }

    /// Returns claims stranded by a previous crash to the waiting state.
    pub async fn requeue_orphans(&self) -> DbResult<u64> {
        self.store.requeue_orphaned_jobs(Utc::now()).await
    }
}

/// The wall-clock time `delay` from now, pinned to the far future if the
/// delay does not fit a timestamp.
fn run_after_from(delay: Duration) -> DateTime<Utc> {
    let now = Utc::now();

    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use ethnum::U256;
    use sqlx::SqlitePool;
    use trestle_db::persistent::sqlite::SqliteDb;
    use trestle_test_utils::deposits::generate_relay_job;

    use super::*;

    fn queue(pool: SqlitePool, retry: QueueRetryConfig) -> JobQueue<SqliteDb> {
        JobQueue::new(Arc::new(SqliteDb::new(pool)), PriorityTiers::default(), retry)
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_enqueue_classifies_priority_by_amount(pool: SqlitePool) {
        let queue = queue(pool, QueueRetryConfig::default());

        // Default tiers: medium from one ether, large from a hundred.
        let mut small = generate_relay_job(1);
        small.amount = U256::new(5);
        let medium = generate_relay_job(2);
        let mut large = generate_relay_job(3);
        large.amount = U256::new(200) * U256::new(1_000_000_000_000_000_000);

        for job in [&small, &medium, &large] {
            queue
                .enqueue_now(job.clone())
                .await
                .expect("must be able to enqueue");
        }

        let claimed_order: Vec<u64> = [
            queue.claim().await,
            queue.claim().await,
            queue.claim().await,
        ]
        .into_iter()
        .map(|claim| {
            claim
                .expect("must be able to claim")
                .expect("a job must be due")
                .deposit_id
                .value()
        })
        .collect();

        assert_eq!(
            claimed_order,
            vec![3, 2, 1],
            "larger deposits must be served first"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_redelivery_budget_ends_in_the_dead_set(pool: SqlitePool) {
        let retry = QueueRetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        };
        let queue = queue(pool, retry);

        queue
            .enqueue_now(generate_relay_job(1))
            .await
            .expect("must be able to enqueue");

        let first = queue
            .claim()
            .await
            .expect("must be able to claim")
            .expect("a job must be due");
        assert_eq!(first.attempts, 1);

        let disposition = queue
            .retry_or_bury(&first, "store hiccup")
            .await
            .expect("must be able to record the failure");
        assert_eq!(
            disposition,
            JobDisposition::Requeued {
                delay: Duration::from_millis(1)
            }
        );

        // Let the backoff elapse, then burn the second and last attempt.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = queue
            .claim()
            .await
            .expect("must be able to claim")
            .expect("the job must come back");
        assert_eq!(second.attempts, 2);

        let disposition = queue
            .retry_or_bury(&second, "store hiccup again")
            .await
            .expect("must be able to record the failure");
        assert_eq!(disposition, JobDisposition::Buried);

        let counts = queue.counts().await.expect("must be able to count");
        assert_eq!(counts.dead, 1);
        assert_eq!(counts.waiting, 0);
    }

    #[test]
    fn far_future_delays_saturate() {
        let run_after = run_after_from(Duration::MAX);
        assert_eq!(run_after, DateTime::<Utc>::MAX_UTC);

        let soon = run_after_from(Duration::from_secs(1));
        assert!(soon > Utc::now(), "a short delay must land in the future");
    }
}
