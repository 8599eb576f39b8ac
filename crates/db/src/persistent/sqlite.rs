//! SQLite implementation of the persistent storage layer.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethnum::U256;
use sqlx::SqlitePool;
use tracing::warn;
use trestle_primitives::{
    amount,
    deposit::{Deposit, DepositStats, DepositStatus, DepositTransition, NewDeposit, Page},
    job::{JobState, QueueCounts},
    types::{Address, DepositId},
};

use super::{config::DbConfig, errors::StorageError, models};
use crate::{
    deposits::{CreateOutcome, DepositDb, TransitionOutcome},
    errors::{DbError, DbResult},
    queue::{JobId, NewJob, QueueDb, QueuedJob},
};

/// The store and queue over a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteDb {
    pool: SqlitePool,
}

impl SqliteDb {
    /// Creates a store over an existing connection pool.
    ///
    /// The pool is expected to point at a database that already carries the
    /// bundled migrations.
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Runs a store operation, retrying transient faults up to the configured count.
///
/// Only faults that [`DbError::is_transient`] classifies as clearable are retried;
/// everything else surfaces immediately.
pub async fn execute_with_retries<T, F, Fut>(config: &DbConfig, op: F) -> DbResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_retry_count() => {
                attempt += 1;
                warn!(%err, %attempt, "transient storage fault, retrying");

                tokio::time::sleep(config.backoff_period()).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[async_trait]
impl DepositDb for SqliteDb {
    async fn insert_deposit_if_absent(&self, deposit: &NewDeposit) -> DbResult<CreateOutcome> {
        let deposit_id = models::to_i64(deposit.deposit_id.value(), "deposit_id")?;
        let token_address = deposit.asset.token_address().map(|addr| addr.to_string());
        let nonce = deposit
            .nonce
            .map(|nonce| models::to_i64(nonce, "nonce"))
            .transpose()?;
        let source_block = models::to_i64(deposit.source_block, "source_block")?;
        let source_timestamp = models::to_i64(deposit.source_timestamp, "source_timestamp")?;

        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO deposits
                (deposit_id, user_address, token_address, amount, nonce, source_tx_hash,
                source_block, source_timestamp, status, retry_count, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(deposit_id)
        .bind(deposit.user.to_string())
        .bind(token_address)
        .bind(deposit.amount.to_string())
        .bind(nonce)
        .bind(deposit.source_tx_hash.to_string())
        .bind(source_block)
        .bind(source_timestamp)
        .bind(DepositStatus::Pending.to_string())
        .bind(0_i64)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;

        Ok(if result.rows_affected() > 0 {
            CreateOutcome::Created
        } else {
            CreateOutcome::AlreadyExists
        })
    }

    async fn transition_deposit(
        &self,
        deposit_id: DepositId,
        expected: &[DepositStatus],
        transition: DepositTransition,
    ) -> DbResult<TransitionOutcome> {
        let id = models::to_i64(deposit_id.value(), "deposit_id")?;

        let mut sets: Vec<&'static str> = vec!["status = ?"];
        if transition.failure_reason().is_some() {
            sets.push("failure_reason = ?");
        }
        if transition.resets_retry() {
            sets.push("failure_reason = NULL");
            sets.push("retry_count = 0");
        }
        if transition.bumps_retry() {
            sets.push("retry_count = retry_count + 1");
        }
        if transition.completion().is_some() {
            sets.push("completed_tx_hash = ?");
            sets.push("completed_at = ?");
        }

        let mut sql = format!(
            "UPDATE deposits SET {} WHERE deposit_id = ?",
            sets.join(", ")
        );
        if !expected.is_empty() {
            let guard = vec!["?"; expected.len()].join(", ");
            sql.push_str(&format!(" AND status IN ({guard})"));
        }

        let mut query = sqlx::query(&sql).bind(transition.to().to_string());
        if let Some(reason) = transition.failure_reason() {
            query = query.bind(reason.to_owned());
        }
        if let Some((tx_hash, at)) = transition.completion() {
            query = query.bind(tx_hash.to_string()).bind(at.timestamp());
        }
        query = query.bind(id);
        for status in expected {
            query = query.bind(status.to_string());
        }

        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let result = query.execute(&mut *tx).await.map_err(StorageError::from)?;
        if result.rows_affected() > 0 {
            tx.commit().await.map_err(StorageError::from)?;

            return Ok(TransitionOutcome::Applied);
        }

        // The guard did not hold. Read the actual status inside the same
        // transaction so the reported conflict cannot be stale.
        let found: Option<(String,)> =
            sqlx::query_as("SELECT status FROM deposits WHERE deposit_id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;

        match found {
            None => Ok(TransitionOutcome::NotFound),
            Some((raw,)) => {
                let actual = raw
                    .parse()
                    .map_err(|e| StorageError::MismatchedTypes(format!("status: {e}")))?;

                Ok(TransitionOutcome::Conflict { actual })
            }
        }
    }

    async fn deposit(&self, deposit_id: DepositId) -> DbResult<Option<Deposit>> {
        let id = models::to_i64(deposit_id.value(), "deposit_id")?;

        let row: Option<models::DepositRow> = sqlx::query_as(
            "SELECT deposit_id, user_address, token_address, amount, nonce, source_tx_hash,
                source_block, source_timestamp, status, retry_count, failure_reason,
                completed_tx_hash, completed_at, created_at
                FROM deposits
                WHERE deposit_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(models::DepositRow::into_deposit).transpose()?)
    }

    async fn deposits_by_user(&self, user: &Address, page: Page) -> DbResult<Vec<Deposit>> {
        let limit = models::to_i64(page.size, "page size")?;
        let offset = models::to_i64(page.offset(), "page offset")?;

        let rows: Vec<models::DepositRow> = sqlx::query_as(
            "SELECT deposit_id, user_address, token_address, amount, nonce, source_tx_hash,
                source_block, source_timestamp, status, retry_count, failure_reason,
                completed_tx_hash, completed_at, created_at
                FROM deposits
                WHERE user_address = $1
                ORDER BY created_at DESC, deposit_id DESC
                LIMIT $2 OFFSET $3",
        )
        .bind(user.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        rows.into_iter()
            .map(|row| row.into_deposit().map_err(DbError::from))
            .collect()
    }

    async fn deposits_in_status(&self, status: DepositStatus) -> DbResult<Vec<Deposit>> {
        let rows: Vec<models::DepositRow> = sqlx::query_as(
            "SELECT deposit_id, user_address, token_address, amount, nonce, source_tx_hash,
                source_block, source_timestamp, status, retry_count, failure_reason,
                completed_tx_hash, completed_at, created_at
                FROM deposits
                WHERE status = $1
                ORDER BY deposit_id ASC",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        rows.into_iter()
            .map(|row| row.into_deposit().map_err(DbError::from))
            .collect()
    }

    async fn deposit_stats(&self) -> DbResult<DepositStats> {
        // Both reads run in one transaction so the counts and the volume describe
        // the same snapshot.
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM deposits GROUP BY status")
                .fetch_all(&mut *tx)
                .await
                .map_err(StorageError::from)?;

        let amounts: Vec<(String,)> = sqlx::query_as("SELECT amount FROM deposits WHERE status = $1")
            .bind(DepositStatus::Completed.to_string())
            .fetch_all(&mut *tx)
            .await
            .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;

        let mut stats = DepositStats::default();
        for (raw_status, count) in counts {
            let status: DepositStatus = raw_status
                .parse()
                .map_err(|e| StorageError::MismatchedTypes(format!("status: {e}")))?;
            let count = models::to_u64(count, "count")?;

            match status {
                DepositStatus::Pending => stats.pending = count,
                DepositStatus::Processing => stats.processing = count,
                DepositStatus::Completed => stats.completed = count,
                DepositStatus::Failed => stats.failed = count,
                DepositStatus::Cancelled => stats.cancelled = count,
            }
        }

        for (raw_amount,) in amounts {
            let value = amount::parse_decimal(&raw_amount)
                .map_err(|e| StorageError::MismatchedTypes(format!("amount: {e}")))?;

            stats.completed_volume = stats
                .completed_volume
                .checked_add(value)
                .unwrap_or(U256::MAX);
        }

        Ok(stats)
    }
}

#[async_trait]
impl QueueDb for SqliteDb {
    async fn enqueue_job(&self, job: &NewJob) -> DbResult<JobId> {
        let deposit_id = models::to_i64(job.deposit_id.value(), "deposit_id")?;
        let payload = serde_json::to_string(&job.payload)
            .map_err(|e| StorageError::InvalidData(format!("payload: {e}")))?;

        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let result = sqlx::query(
            "INSERT INTO relay_queue
                (deposit_id, payload, priority, state, run_after, attempts, enqueued_at)
                VALUES ($1, $2, $3, $4, $5, 0, $6)",
        )
        .bind(deposit_id)
        .bind(payload)
        .bind(job.priority.as_i64())
        .bind(JobState::Waiting.to_string())
        .bind(job.run_after.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;

        Ok(JobId(result.last_insert_rowid()))
    }

    async fn claim_next_job(&self, now: DateTime<Utc>) -> DbResult<Option<QueuedJob>> {
        // Pick and claim in one statement so concurrent workers can never hold
        // the same job.
        let row: Option<models::JobRow> = sqlx::query_as(
            "UPDATE relay_queue
                SET state = $1, attempts = attempts + 1
                WHERE job_id = (
                    SELECT job_id FROM relay_queue
                    WHERE state = $2 AND run_after <= $3
                    ORDER BY priority DESC, job_id ASC
                    LIMIT 1
                ) AND state = $4
                RETURNING job_id, deposit_id, payload, priority, attempts, enqueued_at",
        )
        .bind(JobState::Active.to_string())
        .bind(JobState::Waiting.to_string())
        .bind(now.timestamp_millis())
        .bind(JobState::Waiting.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(models::JobRow::into_queued_job).transpose()?)
    }

    async fn retry_job(
        &self,
        job_id: JobId,
        run_after: DateTime<Utc>,
        error: &str,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        sqlx::query(
            "UPDATE relay_queue SET state = $1, run_after = $2, last_error = $3
                WHERE job_id = $4",
        )
        .bind(JobState::Waiting.to_string())
        .bind(run_after.timestamp_millis())
        .bind(error.to_owned())
        .bind(job_id.0)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;

        Ok(())
    }

    async fn release_job(&self, job_id: JobId, run_after: DateTime<Utc>) -> DbResult<()> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        sqlx::query(
            "UPDATE relay_queue
                SET state = $1, run_after = $2, attempts = MAX(attempts - 1, 0)
                WHERE job_id = $3",
        )
        .bind(JobState::Waiting.to_string())
        .bind(run_after.timestamp_millis())
        .bind(job_id.0)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;

        Ok(())
    }

    async fn complete_job(&self, job_id: JobId) -> DbResult<()> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        sqlx::query("UPDATE relay_queue SET state = $1 WHERE job_id = $2")
            .bind(JobState::Completed.to_string())
            .bind(job_id.0)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;

        Ok(())
    }

    async fn bury_job(&self, job_id: JobId, error: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        sqlx::query("UPDATE relay_queue SET state = $1, last_error = $2 WHERE job_id = $3")
            .bind(JobState::Dead.to_string())
            .bind(error.to_owned())
            .bind(job_id.0)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;

        Ok(())
    }

    async fn has_live_job(&self, deposit_id: DepositId) -> DbResult<bool> {
        let id = models::to_i64(deposit_id.value(), "deposit_id")?;

        let live: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM relay_queue WHERE deposit_id = $1 AND state IN ($2, $3))",
        )
        .bind(id)
        .bind(JobState::Waiting.to_string())
        .bind(JobState::Active.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(live)
    }

    async fn queue_counts(&self) -> DbResult<QueueCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM relay_queue GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;

        let mut counts = QueueCounts::default();
        for (raw_state, count) in rows {
            let state: JobState = raw_state
                .parse()
                .map_err(|e| StorageError::MismatchedTypes(format!("state: {e}")))?;
            let count = models::to_u64(count, "count")?;

            match state {
                JobState::Waiting => counts.waiting = count,
                JobState::Active => counts.active = count,
                JobState::Completed => counts.completed = count,
                JobState::Dead => counts.dead = count,
            }
        }

        Ok(counts)
    }

    async fn requeue_orphaned_jobs(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let result = sqlx::query("UPDATE relay_queue SET state = $1, run_after = $2 WHERE state = $3")
            .bind(JobState::Waiting.to_string())
            .bind(now.timestamp_millis())
            .bind(JobState::Active.to_string())
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use trestle_primitives::job::JobPriority;
    use trestle_test_utils::{
        deposits::{generate_new_deposit, generate_relay_job, ONE_ETHER},
        random::{generate_address, generate_tx_hash},
    };

    use super::*;

    fn waiting_job(deposit_id: u64, priority: JobPriority, run_after: DateTime<Utc>) -> NewJob {
        NewJob {
            deposit_id: DepositId(deposit_id),
            payload: generate_relay_job(deposit_id),
            priority,
            run_after,
        }
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_deposit_create_is_idempotent(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let deposit = generate_new_deposit(1);

        assert!(
            db.deposit(deposit.deposit_id)
                .await
                .is_ok_and(|v| v.is_none()),
            "deposit must not exist initially"
        );

        let first = db
            .insert_deposit_if_absent(&deposit)
            .await
            .expect("must be able to insert");
        assert_eq!(first, CreateOutcome::Created);

        let second = db
            .insert_deposit_if_absent(&deposit)
            .await
            .expect("replay must not error");
        assert_eq!(second, CreateOutcome::AlreadyExists);

        let stored = db
            .deposit(deposit.deposit_id)
            .await
            .expect("must be able to fetch")
            .expect("deposit must exist after inserting");
        assert_eq!(stored.status, DepositStatus::Pending);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(stored.user, deposit.user);
        assert_eq!(stored.amount, deposit.amount);

        // A replay carrying different details must not overwrite the record.
        let mut replay = deposit.clone();
        replay.amount = U256::new(5);
        assert!(
            db.insert_deposit_if_absent(&replay)
                .await
                .is_ok_and(|v| v == CreateOutcome::AlreadyExists),
            "replayed id must be ignored"
        );

        let stored = db
            .deposit(deposit.deposit_id)
            .await
            .expect("must be able to fetch")
            .expect("deposit must exist");
        assert_eq!(
            stored.amount, deposit.amount,
            "original amount must survive a replay"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_concurrent_creates_insert_exactly_once(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let deposit = generate_new_deposit(1);

        let (a, b) = tokio::join!(
            db.insert_deposit_if_absent(&deposit),
            db.insert_deposit_if_absent(&deposit)
        );
        let a = a.expect("concurrent insert must not error");
        let b = b.expect("concurrent insert must not error");

        assert!(
            a.is_created() ^ b.is_created(),
            "exactly one concurrent insert must win, got {a:?} and {b:?}"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_guarded_transitions(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let deposit = generate_new_deposit(1);
        db.insert_deposit_if_absent(&deposit)
            .await
            .expect("must be able to insert");

        let claimed = db
            .transition_deposit(
                deposit.deposit_id,
                &[DepositStatus::Pending],
                DepositTransition::processing(),
            )
            .await
            .expect("must be able to transition");
        assert_eq!(claimed, TransitionOutcome::Applied);

        // A second claim loses and reports what it found.
        let second = db
            .transition_deposit(
                deposit.deposit_id,
                &[DepositStatus::Pending],
                DepositTransition::processing(),
            )
            .await
            .expect("a lost claim must not error");
        assert_eq!(
            second,
            TransitionOutcome::Conflict {
                actual: DepositStatus::Processing
            }
        );

        let tx_hash = generate_tx_hash();
        let at = DateTime::from_timestamp(1_700_000_100, 0).expect("must be a valid timestamp");
        let done = db
            .transition_deposit(
                deposit.deposit_id,
                &[DepositStatus::Processing],
                DepositTransition::completed(tx_hash, at),
            )
            .await
            .expect("must be able to transition");
        assert!(done.is_applied());

        let stored = db
            .deposit(deposit.deposit_id)
            .await
            .expect("must be able to fetch")
            .expect("deposit must exist");
        assert_eq!(stored.status, DepositStatus::Completed);
        assert_eq!(stored.completed_tx_hash, Some(tx_hash));
        assert_eq!(stored.completed_at, Some(at));

        let missing = db
            .transition_deposit(DepositId(999), &[], DepositTransition::processing())
            .await
            .expect("an unknown id must not error");
        assert_eq!(missing, TransitionOutcome::NotFound);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_retry_counter_effects(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let deposit = generate_new_deposit(1);
        let id = deposit.deposit_id;
        db.insert_deposit_if_absent(&deposit)
            .await
            .expect("must be able to insert");

        db.transition_deposit(id, &[DepositStatus::Pending], DepositTransition::processing())
            .await
            .expect("must be able to claim");
        db.transition_deposit(
            id,
            &[DepositStatus::Processing],
            DepositTransition::retry_pending("destination rpc timeout"),
        )
        .await
        .expect("must be able to schedule a retry");

        let stored = db
            .deposit(id)
            .await
            .expect("must be able to fetch")
            .expect("deposit must exist");
        assert_eq!(stored.status, DepositStatus::Pending);
        assert_eq!(stored.retry_count, 1, "a scheduled retry must bump the counter");
        assert_eq!(
            stored.failure_reason.as_deref(),
            Some("destination rpc timeout")
        );

        db.transition_deposit(id, &[DepositStatus::Pending], DepositTransition::processing())
            .await
            .expect("must be able to claim again");
        db.transition_deposit(
            id,
            &[DepositStatus::Processing],
            DepositTransition::failed("retries exhausted"),
        )
        .await
        .expect("must be able to fail");

        let stored = db
            .deposit(id)
            .await
            .expect("must be able to fetch")
            .expect("deposit must exist");
        assert_eq!(stored.status, DepositStatus::Failed);
        assert_eq!(
            stored.retry_count, 1,
            "terminal failure must not consume another retry"
        );

        db.transition_deposit(
            id,
            &[DepositStatus::Failed],
            DepositTransition::pending_for_retry(),
        )
        .await
        .expect("must be able to revive");

        let stored = db
            .deposit(id)
            .await
            .expect("must be able to fetch")
            .expect("deposit must exist");
        assert_eq!(stored.status, DepositStatus::Pending);
        assert_eq!(stored.retry_count, 0, "revival must reset the counter");
        assert_eq!(stored.failure_reason, None, "revival must clear the reason");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_user_listing_and_stats(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let user = generate_address();

        for id in 1..=5_u64 {
            let mut deposit = generate_new_deposit(id);
            deposit.user = user;
            db.insert_deposit_if_absent(&deposit)
                .await
                .expect("must be able to insert");
        }
        // Someone else's deposit must never show up in the listing.
        db.insert_deposit_if_absent(&generate_new_deposit(6))
            .await
            .expect("must be able to insert");

        let first_page = db
            .deposits_by_user(&user, Page::new(0, 2))
            .await
            .expect("must be able to list");
        assert_eq!(
            first_page
                .iter()
                .map(|d| d.deposit_id.value())
                .collect::<Vec<_>>(),
            vec![5, 4],
            "listing must be newest first"
        );

        let last_page = db
            .deposits_by_user(&user, Page::new(2, 2))
            .await
            .expect("must be able to list");
        assert_eq!(last_page.len(), 1);
        assert_eq!(last_page[0].deposit_id.value(), 1);

        let beyond = db
            .deposits_by_user(&user, Page::new(3, 2))
            .await
            .expect("must be able to list");
        assert!(beyond.is_empty(), "pages past the end must be empty");

        let at = DateTime::from_timestamp(1_700_000_100, 0).expect("must be a valid timestamp");
        db.transition_deposit(DepositId(1), &[], DepositTransition::processing())
            .await
            .expect("must be able to claim");
        db.transition_deposit(
            DepositId(1),
            &[],
            DepositTransition::completed(generate_tx_hash(), at),
        )
        .await
        .expect("must be able to complete");
        db.transition_deposit(
            DepositId(2),
            &[],
            DepositTransition::failed("amount below minimum"),
        )
        .await
        .expect("must be able to fail");

        let stats = db.deposit_stats().await.expect("must be able to aggregate");
        assert_eq!(stats.pending, 4);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cancelled, 0);
        assert_eq!(stats.total(), 6);
        assert_eq!(
            stats.completed_volume, ONE_ETHER,
            "volume must sum exactly the completed amounts"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_queue_orders_by_priority_then_age(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let now = Utc::now();

        db.enqueue_job(&waiting_job(1, JobPriority::Default, now))
            .await
            .expect("must be able to enqueue");
        db.enqueue_job(&waiting_job(2, JobPriority::Large, now))
            .await
            .expect("must be able to enqueue");
        db.enqueue_job(&waiting_job(3, JobPriority::Medium, now))
            .await
            .expect("must be able to enqueue");

        let first = db
            .claim_next_job(now)
            .await
            .expect("must be able to claim")
            .expect("a due job must be claimable");
        assert_eq!(
            first.deposit_id,
            DepositId(2),
            "the largest tier must be served first"
        );
        assert_eq!(first.attempts, 1, "claiming must count an attempt");

        let second = db
            .claim_next_job(now)
            .await
            .expect("must be able to claim")
            .expect("a due job must be claimable");
        assert_eq!(second.deposit_id, DepositId(3));

        let third = db
            .claim_next_job(now)
            .await
            .expect("must be able to claim")
            .expect("a due job must be claimable");
        assert_eq!(third.deposit_id, DepositId(1));

        assert!(
            db.claim_next_job(now).await.is_ok_and(|v| v.is_none()),
            "an empty queue must yield nothing"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_delayed_jobs_stay_invisible_until_due(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let now = Utc::now();
        let due_at = now + chrono::Duration::seconds(30);

        db.enqueue_job(&waiting_job(1, JobPriority::Large, due_at))
            .await
            .expect("must be able to enqueue");

        assert!(
            db.claim_next_job(now).await.is_ok_and(|v| v.is_none()),
            "a delayed job must not be claimable before its due time"
        );
        assert!(
            db.claim_next_job(due_at).await.is_ok_and(|v| v.is_some()),
            "a delayed job must be claimable once due"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_job_acks_drive_states_and_counts(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(10);

        for id in 1..=4_u64 {
            db.enqueue_job(&waiting_job(id, JobPriority::Default, now))
                .await
                .expect("must be able to enqueue");
        }

        let a = db
            .claim_next_job(now)
            .await
            .expect("must be able to claim")
            .expect("a due job must be claimable");
        let b = db
            .claim_next_job(now)
            .await
            .expect("must be able to claim")
            .expect("a due job must be claimable");
        let c = db
            .claim_next_job(now)
            .await
            .expect("must be able to claim")
            .expect("a due job must be claimable");

        db.complete_job(a.job_id)
            .await
            .expect("must be able to complete");
        db.retry_job(b.job_id, later, "destination rpc timeout")
            .await
            .expect("must be able to retry");
        db.bury_job(c.job_id, "attempts exhausted")
            .await
            .expect("must be able to bury");

        let counts = db.queue_counts().await.expect("must be able to count");
        assert_eq!(
            counts,
            QueueCounts {
                waiting: 2,
                active: 0,
                completed: 1,
                dead: 1
            }
        );

        // The retried job comes back with its history intact.
        let retried = db
            .claim_next_job(later)
            .await
            .expect("must be able to claim")
            .expect("the retried job must be due");
        assert_eq!(retried.job_id, b.job_id);
        assert_eq!(retried.attempts, 2);

        // A released claim is forgotten entirely.
        db.release_job(retried.job_id, now)
            .await
            .expect("must be able to release");
        let again = db
            .claim_next_job(later)
            .await
            .expect("must be able to claim")
            .expect("the released job must be due");
        assert_eq!(again.job_id, b.job_id);
        assert_eq!(
            again.attempts, 2,
            "a released claim must not count as an attempt"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_live_job_lookup_sees_waiting_and_active_only(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let now = Utc::now();

        assert!(
            db.has_live_job(DepositId(1)).await.is_ok_and(|v| !v),
            "an empty queue must have no live jobs"
        );

        db.enqueue_job(&waiting_job(1, JobPriority::Default, now))
            .await
            .expect("must be able to enqueue");
        assert!(
            db.has_live_job(DepositId(1)).await.is_ok_and(|v| v),
            "a waiting job must count as live"
        );

        let claimed = db
            .claim_next_job(now)
            .await
            .expect("must be able to claim")
            .expect("a due job must be claimable");
        assert!(
            db.has_live_job(DepositId(1)).await.is_ok_and(|v| v),
            "an active job must count as live"
        );

        db.complete_job(claimed.job_id)
            .await
            .expect("must be able to complete");
        assert!(
            db.has_live_job(DepositId(1)).await.is_ok_and(|v| !v),
            "a completed job must not count as live"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_startup_requeues_orphaned_claims(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let now = Utc::now();

        db.enqueue_job(&waiting_job(1, JobPriority::Default, now))
            .await
            .expect("must be able to enqueue");
        db.enqueue_job(&waiting_job(2, JobPriority::Default, now))
            .await
            .expect("must be able to enqueue");

        let claimed = db
            .claim_next_job(now)
            .await
            .expect("must be able to claim")
            .expect("a due job must be claimable");
        assert_eq!(claimed.deposit_id, DepositId(1));

        let requeued = db
            .requeue_orphaned_jobs(now)
            .await
            .expect("must be able to requeue");
        assert_eq!(requeued, 1, "only the orphaned claim must be touched");

        let counts = db.queue_counts().await.expect("must be able to count");
        assert_eq!(counts.waiting, 2);
        assert_eq!(counts.active, 0);

        // The orphan comes back and its re-delivery shows in the attempt count.
        let redelivered = db
            .claim_next_job(now)
            .await
            .expect("must be able to claim")
            .expect("the orphan must be claimable again");
        assert_eq!(redelivered.deposit_id, DepositId(1));
        assert_eq!(redelivered.attempts, 2);
    }

    #[tokio::test]
    async fn test_execute_with_retries_returns_the_value() {
        let config = DbConfig::default();

        let value = execute_with_retries(&config, || async { Ok::<_, DbError>(7) })
            .await
            .expect("must succeed");
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_execute_with_retries_retries_transient_faults() {
        let config = DbConfig::default()
            .with_max_retry_count(2)
            .with_backoff_period(Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result: DbResult<()> = execute_with_retries(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DbError::Storage(StorageError::Driver(
                        sqlx::Error::PoolTimedOut,
                    )))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok(), "the retried call must eventually succeed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_with_retries_passes_through_permanent_faults() {
        let config = DbConfig::default()
            .with_max_retry_count(3)
            .with_backoff_period(Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result: DbResult<()> = execute_with_retries(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbError::Storage(StorageError::InvalidData("bad row".into()))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "a permanent fault must not be retried"
        );
    }
}
