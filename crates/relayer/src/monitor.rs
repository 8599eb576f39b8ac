//! The deposit monitor: a live event feed with a bounded backfill on every
//! (re)connect.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::StreamExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trestle_bridge_params::chain::SourceChainParams;
use trestle_chain::traits::SourceChain;
use trestle_db::{deposits::DepositDb, queue::QueueDb};
use trestle_primitives::{event::DepositEvent, job::RelayJob, types::BlockHeight};

use crate::{config::MonitorConfig, errors::RelayResult, queue::JobQueue};

/// Shared view of the newest block the monitor has seen a deposit in.
///
/// Health signal only: nothing gates on it, but a value that stops moving
/// while the chain does tells an operator the feed is wedged.
#[derive(Debug, Clone, Default)]
pub struct ObservedHead(Arc<AtomicU64>);

impl ObservedHead {
    /// Records `block` if it is newer than the current value.
    fn note(&self, block: BlockHeight) {
        self.0.fetch_max(block, Ordering::Relaxed);
    }

    /// The newest deposit block observed so far, zero before the first event.
    pub fn get(&self) -> BlockHeight {
        self.0.load(Ordering::Relaxed)
    }
}

/// Why a connected monitor pass ended.
enum SyncEnd {
    /// Shutdown was requested.
    Cancelled,

    /// The live feed closed; the caller reconnects.
    FeedEnded,
}

/// Watches the source chain for deposit events and feeds the relay queue.
///
/// Runs forever: a dropped feed or a failing node is retried with capped
/// exponential backoff, and each reconnect rescans a bounded window of recent
/// blocks so events that fired while disconnected are not lost.
#[derive(Debug)]
pub struct DepositMonitor<DB, S> {
    db: Arc<DB>,
    queue: JobQueue<DB>,
    source: Arc<S>,
    config: MonitorConfig,
    source_params: SourceChainParams,
    observed_head: ObservedHead,
}

impl<DB, S> DepositMonitor<DB, S>
where
    DB: DepositDb + QueueDb + Send + Sync,
    S: SourceChain,
{
    /// Builds a monitor; nothing runs until [`Self::run`].
    pub fn new(
        db: Arc<DB>,
        queue: JobQueue<DB>,
        source: Arc<S>,
        config: MonitorConfig,
        source_params: SourceChainParams,
    ) -> Self {
        Self {
            db,
            queue,
            source,
            config,
            source_params,
            observed_head: ObservedHead::default(),
        }
    }

    /// Handle for reading the newest observed deposit block.
    pub fn observed_head(&self) -> ObservedHead {
        self.observed_head.clone()
    }

    /// Runs the monitor until shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("deposit monitor started");
        let mut delay = self.config.reconnect_base_delay;

        loop {
            let end = self.sync_once(&shutdown).await;

            match &end {
                Ok(SyncEnd::Cancelled) => break,
                Ok(SyncEnd::FeedEnded) => {
                    warn!("deposit feed ended; reconnecting");
                }
                Err(err) => {
                    warn!(%err, retry_in = ?delay, "monitor pass failed");
                }
            }

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = sleep(delay) => {}
            }

            // A pass that held a connection resets the backoff; consecutive
            // failures double it up to the cap.
            delay = if end.is_ok() {
                self.config.reconnect_base_delay
            } else {
                delay
                    .saturating_mul(2)
                    .min(self.config.reconnect_max_delay)
            };
        }

        info!("deposit monitor stopped");
    }

    /// One connected pass: subscribe, rescan the recent window, then consume
    /// the live feed until it ends.
    async fn sync_once(&self, shutdown: &CancellationToken) -> RelayResult<SyncEnd> {
        // Subscribing before the head is read means no block can fall between
        // the backfill window and the first live event.
        let mut feed = self.source.subscribe_deposits().await?;

        let head = self.source.block_height().await?;
        self.backfill(head, shutdown).await?;

        info!(head, "live deposit feed established");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(SyncEnd::Cancelled),
                event = feed.next() => match event {
                    Some(event) => {
                        // Live events are at the head by definition.
                        let head = event.block_number;
                        self.ingest_event(event, head).await;
                    }
                    None => return Ok(SyncEnd::FeedEnded),
                },
            }
        }
    }

    /// Rescans the trailing window below `head` in bounded chunks.
    async fn backfill(&self, head: BlockHeight, shutdown: &CancellationToken) -> RelayResult<()> {
        let start = head.saturating_sub(self.config.backfill_window);
        let chunk = self.config.chunk_size.max(1);
        debug!(start, head, "backfilling recent blocks");

        let mut from = start;
        while from <= head {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let to = head.min(from.saturating_add(chunk - 1));
            let events = self.source.deposit_events(from, to).await?;
            debug!(from, to, count = events.len(), "backfill chunk");

            for event in events {
                self.ingest_event(event, head).await;
            }

            match to.checked_add(1) {
                Some(next) => from = next,
                None => break,
            }
        }

        Ok(())
    }

    /// Records one observed deposit. Errors are logged and absorbed so a bad
    /// event or a store hiccup cannot take the feed down with it.
    async fn ingest_event(&self, event: DepositEvent, head: BlockHeight) {
        let deposit_id = event.deposit_id;

        if let Err(err) = self.try_ingest(event, head).await {
            warn!(
                deposit_id = deposit_id.value(),
                %err,
                "failed to ingest a deposit event"
            );
        }
    }

    async fn try_ingest(&self, event: DepositEvent, head: BlockHeight) -> RelayResult<()> {
        self.observed_head.note(event.block_number);

        let deposit = event.to_new_deposit();
        let created = self
            .db
            .insert_deposit_if_absent(&deposit)
            .await?
            .is_created();
        if !created {
            debug!(
                deposit_id = deposit.deposit_id.value(),
                "deposit already recorded"
            );
            return Ok(());
        }

        let delay = self.schedule_delay(deposit.source_block, head);
        let job_id = self
            .queue
            .enqueue_delayed(RelayJob::from(&deposit), delay)
            .await?;

        info!(
            deposit_id = deposit.deposit_id.value(),
            block = deposit.source_block,
            %job_id,
            ?delay,
            "new deposit recorded"
        );

        Ok(())
    }

    /// Time until the deposit's block is expected to be deep enough, given
    /// the head at observation time. Scheduling hint only; the worker
    /// re-checks the live depth before acting.
    fn schedule_delay(&self, source_block: BlockHeight, head: BlockHeight) -> Duration {
        let target = source_block.saturating_add(self.source_params.required_confirmations);
        let remaining = target.saturating_sub(head);

        self.source_params
            .block_time
            .saturating_mul(u32::try_from(remaining).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use sqlx::SqlitePool;
    use trestle_bridge_params::tiers::PriorityTiers;
    use trestle_db::persistent::sqlite::SqliteDb;
    use trestle_primitives::{deposit::DepositStatus, types::DepositId};
    use trestle_test_utils::{
        deposits::{generate_deposit_event, FIXTURE_BLOCK},
        mock::MockChain,
    };

    use super::*;
    use crate::config::QueueRetryConfig;

    fn monitor_harness(
        pool: SqlitePool,
    ) -> (
        DepositMonitor<SqliteDb, MockChain>,
        Arc<SqliteDb>,
        JobQueue<SqliteDb>,
        MockChain,
    ) {
        let db = Arc::new(SqliteDb::new(pool));
        let queue = JobQueue::new(
            Arc::clone(&db),
            PriorityTiers::default(),
            QueueRetryConfig::default(),
        );
        let chain = MockChain::new();
        let config = MonitorConfig {
            backfill_window: 9,
            chunk_size: 3,
            reconnect_base_delay: Duration::from_millis(5),
            reconnect_max_delay: Duration::from_millis(20),
        };
        let monitor = DepositMonitor::new(
            Arc::clone(&db),
            queue.clone(),
            Arc::new(chain.clone()),
            config,
            SourceChainParams::default(),
        );

        (monitor, db, queue, chain)
    }

    async fn wait_for<F, Fut>(what: &str, mut probe: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

        while !probe().await {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {what}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_replayed_events_record_and_schedule_once(pool: SqlitePool) {
        let (monitor, db, queue, _chain) = monitor_harness(pool);

        let event = generate_deposit_event(1);
        monitor.ingest_event(event.clone(), event.block_number).await;
        monitor.ingest_event(event.clone(), event.block_number).await;

        let stored = db
            .deposit(DepositId(1))
            .await
            .expect("must be able to fetch the deposit")
            .expect("the deposit must exist");
        assert_eq!(stored.status, DepositStatus::Pending);

        let counts = queue.counts().await.expect("must be able to count");
        assert_eq!(
            counts.waiting, 1,
            "a replayed event must not schedule a second job"
        );
        assert_eq!(monitor.observed_head().get(), FIXTURE_BLOCK);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_backfill_scans_the_window_in_chunks(pool: SqlitePool) {
        let (monitor, db, queue, chain) = monitor_harness(pool);
        chain.set_height(100);

        for (deposit_id, block) in [(1, 80), (2, 91), (3, 95), (4, 100)] {
            let mut event = generate_deposit_event(deposit_id);
            event.block_number = block;
            chain.push_deposit(event);
        }

        let shutdown = CancellationToken::new();
        monitor
            .backfill(100, &shutdown)
            .await
            .expect("backfill must succeed");

        assert_eq!(
            chain.event_queries(),
            vec![(91, 93), (94, 96), (97, 99), (100, 100)],
            "the window must be scanned in bounded inclusive chunks"
        );

        assert!(
            db.deposit(DepositId(1))
                .await
                .expect("must be able to fetch")
                .is_none(),
            "blocks before the window must be skipped"
        );
        for deposit_id in [2, 3, 4] {
            assert!(
                db.deposit(DepositId(deposit_id))
                    .await
                    .expect("must be able to fetch")
                    .is_some(),
                "deposit {deposit_id} must be backfilled"
            );
        }

        let counts = queue.counts().await.expect("must be able to count");
        assert_eq!(counts.waiting, 3);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_monitor_reconnects_and_replays_missed_events(pool: SqlitePool) {
        let (monitor, db, queue, chain) = monitor_harness(pool);
        chain.set_height(100);

        let observed = monitor.observed_head();
        let shutdown = CancellationToken::new();
        let runner = tokio::spawn(monitor.run(shutdown.clone()));

        {
            let chain = chain.clone();
            wait_for("the first subscription", move || {
                let chain = chain.clone();
                async move { chain.subscribe_calls() >= 1 }
            })
            .await;
        }

        // A live event arrives over the feed.
        chain.push_deposit(generate_deposit_event(1));
        {
            let db = Arc::clone(&db);
            wait_for("the live event to be recorded", move || {
                let db = Arc::clone(&db);
                async move {
                    db.deposit(DepositId(1))
                        .await
                        .is_ok_and(|found| found.is_some())
                }
            })
            .await;
        }

        // The connection drops, and an event fires while nobody listens.
        chain.disconnect_feeds();
        let mut missed = generate_deposit_event(2);
        missed.block_number = 100;
        chain.push_deposit(missed);

        // The reconnect backfill must pick it up.
        {
            let db = Arc::clone(&db);
            wait_for("the missed event to be backfilled", move || {
                let db = Arc::clone(&db);
                async move {
                    db.deposit(DepositId(2))
                        .await
                        .is_ok_and(|found| found.is_some())
                }
            })
            .await;
        }
        assert!(chain.subscribe_calls() >= 2, "the monitor must resubscribe");

        shutdown.cancel();
        runner.await.expect("the monitor must stop cleanly");

        assert_eq!(observed.get(), 100);

        // The replayed window must not have scheduled anything twice.
        let counts = queue.counts().await.expect("must be able to count");
        assert_eq!(counts.waiting, 2);
    }
}
