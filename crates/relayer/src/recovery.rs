//! Startup reconciliation of work a previous process left unfinished.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use trestle_chain::traits::DestinationChain;
use trestle_db::{deposits::DepositDb, queue::QueueDb};
use trestle_primitives::{
    deposit::{DepositStatus, DepositTransition},
    job::RelayJob,
};

use crate::{errors::RelayResult, queue::JobQueue};

/// What startup reconciliation found and fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Deposits whose release had already landed and were recorded completed.
    pub reconciled: u64,

    /// Deposits returned from processing to pending.
    pub released: u64,

    /// Pending deposits that had lost their queue job and got a fresh one.
    pub requeued: u64,

    /// Queue claims stranded by the previous shutdown.
    pub orphaned_jobs: u64,
}

/// Repairs store and queue state after an unclean shutdown.
///
/// Must finish before the first worker claims: it assumes nothing else is
/// mutating deposits while it sweeps.
#[derive(Debug)]
pub struct StartupRecovery<DB, D> {
    db: Arc<DB>,
    queue: JobQueue<DB>,
    destination: Arc<D>,
}

impl<DB, D> StartupRecovery<DB, D>
where
    DB: DepositDb + QueueDb + Send + Sync,
    D: DestinationChain,
{
    /// Builds the recovery pass.
    pub fn new(db: Arc<DB>, queue: JobQueue<DB>, destination: Arc<D>) -> Self {
        Self {
            db,
            queue,
            destination,
        }
    }

    /// Runs every sweep, in an order that leaves no deposit stranded: stranded
    /// claims first, then stuck processing records, then pending records
    /// without a job (which the previous sweep may have just produced).
    pub async fn run(&self) -> RelayResult<RecoveryReport> {
        let orphaned_jobs = self.queue.requeue_orphans().await?;
        let (reconciled, released) = self.reclaim_processing().await?;
        let requeued = self.requeue_pending().await?;

        let report = RecoveryReport {
            reconciled,
            released,
            requeued,
            orphaned_jobs,
        };
        info!(?report, "startup recovery finished");

        Ok(report)
    }

    /// Deposits stuck at processing: adopt the release if it landed, hand the
    /// deposit back to pending otherwise.
    async fn reclaim_processing(&self) -> RelayResult<(u64, u64)> {
        let stuck = self
            .db
            .deposits_in_status(DepositStatus::Processing)
            .await?;
        let mut reconciled = 0;
        let mut released = 0;

        for deposit in stuck {
            let deposit_id = deposit.deposit_id;

            match self.destination.completed_release(deposit_id).await? {
                Some(tx_hash) => {
                    info!(
                        deposit_id = deposit_id.value(),
                        %tx_hash,
                        "recording a release that landed before the crash"
                    );
                    let outcome = self
                        .db
                        .transition_deposit(
                            deposit_id,
                            &[DepositStatus::Processing],
                            DepositTransition::completed(tx_hash, Utc::now()),
                        )
                        .await?;
                    if outcome.is_applied() {
                        reconciled += 1;
                    }
                }
                None => {
                    let outcome = self
                        .db
                        .transition_deposit(
                            deposit_id,
                            &[DepositStatus::Processing],
                            DepositTransition::released(),
                        )
                        .await?;
                    if outcome.is_applied() {
                        released += 1;
                    }
                }
            }
        }

        Ok((reconciled, released))
    }

    /// Pending deposits with no waiting or active job get a fresh one. This
    /// closes the crash window between recording a deposit and enqueueing it.
    async fn requeue_pending(&self) -> RelayResult<u64> {
        let pending = self.db.deposits_in_status(DepositStatus::Pending).await?;
        let mut requeued = 0;

        for deposit in pending {
            let deposit_id = deposit.deposit_id;
            if self.queue.has_live_job(deposit_id).await? {
                continue;
            }

            warn!(
                deposit_id = deposit_id.value(),
                "pending deposit had no scheduled job; requeueing"
            );
            self.queue.enqueue_now(RelayJob::from(&deposit)).await?;
            requeued += 1;
        }

        Ok(requeued)
    }
}
