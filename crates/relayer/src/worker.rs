//! The relay workers: claim scheduled jobs, hold them until the deposit is
//! buried deep enough, validate the amount and execute the release.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{sync::Mutex as AsyncMutex, task::JoinSet, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trestle_bridge_params::{chain::SourceChainParams, limits::BridgeLimits, retry::RetryParams};
use trestle_chain::traits::{DestinationChain, Receipt, SourceChain};
use trestle_db::{
    deposits::{DepositDb, TransitionOutcome},
    queue::{QueueDb, QueuedJob},
};
use trestle_primitives::{
    deposit::{AssetKind, DepositStatus, DepositTransition},
    job::RelayJob,
    types::{Address, BlockHeight, DepositId},
};

use crate::{
    config::WorkerConfig,
    errors::RelayResult,
    queue::{JobDisposition, JobQueue},
};

/// The chain-facing policy a worker applies to every deposit it relays.
#[derive(Debug, Clone, Default)]
pub struct RelayPolicy {
    /// Source ledger parameters; the confirmation depth comes from here.
    pub source: SourceChainParams,

    /// Bridgeable amount windows.
    pub limits: BridgeLimits,

    /// Deposit-level retry policy for execution failures.
    pub retry: RetryParams,
}

/// One submission at a time per signing key, so that destination nonces are
/// assigned in a single file.
#[derive(Debug, Default)]
struct SubmissionLocks {
    locks: parking_lot::Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>,
}

impl SubmissionLocks {
    fn for_signer(&self, signer: Address) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.locks.lock().entry(signer).or_default())
    }
}

/// How a claimed job ended, from the queue's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobVerdict {
    /// The job is finished and must not be redelivered. This covers terminal
    /// deposit outcomes and silent drops of stale jobs alike.
    Done,

    /// Shutdown interrupted the job before any side effect; redeliver it
    /// without counting the delivery.
    Interrupted,
}

/// Outcome of the confirmation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateOutcome {
    /// The deposit block is buried deep enough.
    Confirmed,

    /// Shutdown won the race while waiting.
    Interrupted,
}

/// A pool of relay workers draining the job queue.
#[derive(Debug)]
pub struct RelayWorkerPool<DB, S, D> {
    db: Arc<DB>,
    queue: JobQueue<DB>,
    source: Arc<S>,
    destination: Arc<D>,
    config: WorkerConfig,
    policy: RelayPolicy,
    locks: SubmissionLocks,
}

impl<DB, S, D> RelayWorkerPool<DB, S, D>
where
    DB: DepositDb + QueueDb + Send + Sync + 'static,
    S: SourceChain + 'static,
    D: DestinationChain + 'static,
{
    /// Builds a pool; no workers run until [`Self::spawn`].
    pub fn new(
        db: Arc<DB>,
        queue: JobQueue<DB>,
        source: Arc<S>,
        destination: Arc<D>,
        config: WorkerConfig,
        policy: RelayPolicy,
    ) -> Self {
        Self {
            db,
            queue,
            source,
            destination,
            config,
            policy,
            locks: SubmissionLocks::default(),
        }
    }

    /// Spawns the configured number of workers into `tasks`.
    pub fn spawn(self: Arc<Self>, tasks: &mut JoinSet<()>, shutdown: CancellationToken) {
        for worker_id in 0..self.config.workers {
            let pool = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tasks.spawn(async move { pool.run_worker(worker_id, shutdown).await });
        }
    }

    async fn run_worker(&self, worker_id: usize, shutdown: CancellationToken) {
        info!(worker_id, "relay worker started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let claimed = match self.queue.claim().await {
                Ok(claimed) => claimed,
                Err(err) => {
                    error!(worker_id, %err, "failed to claim a job");
                    None
                }
            };

            let Some(job) = claimed else {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    () = sleep(self.config.poll_interval) => continue,
                }
            };

            self.drive_job(worker_id, job, &shutdown).await;
        }

        info!(worker_id, "relay worker stopped");
    }

    /// Runs one claimed job to a verdict and acknowledges it accordingly.
    async fn drive_job(&self, worker_id: usize, job: QueuedJob, shutdown: &CancellationToken) {
        debug!(
            worker_id,
            job_id = %job.job_id,
            deposit_id = job.deposit_id.value(),
            attempts = job.attempts,
            "picked up job"
        );

        match self.process_job(&job, shutdown).await {
            Ok(JobVerdict::Done) => {
                if let Err(err) = self.queue.complete(job.job_id).await {
                    error!(worker_id, %err, job_id = %job.job_id, "failed to acknowledge a finished job");
                }
            }
            Ok(JobVerdict::Interrupted) => {
                if let Err(err) = self.queue.release(job.job_id).await {
                    error!(worker_id, %err, job_id = %job.job_id, "failed to release an interrupted job");
                }
            }
            Err(err) => {
                warn!(
                    worker_id,
                    %err,
                    job_id = %job.job_id,
                    deposit_id = job.deposit_id.value(),
                    "job handler failed"
                );

                match self.queue.retry_or_bury(&job, &err.to_string()).await {
                    Ok(JobDisposition::Requeued { delay }) => {
                        debug!(job_id = %job.job_id, ?delay, "job requeued");
                    }
                    Ok(JobDisposition::Buried) => {}
                    Err(err) => {
                        error!(worker_id, %err, job_id = %job.job_id, "failed to record the job failure");
                    }
                }
            }
        }
    }

    /// Claims the deposit for this job and relays it.
    ///
    /// The status guard is what makes duplicate jobs harmless: whichever
    /// delivery flips the deposit to processing first runs the relay, every
    /// other one reconciles or drops.
    async fn process_job(
        &self,
        job: &QueuedJob,
        shutdown: &CancellationToken,
    ) -> RelayResult<JobVerdict> {
        let deposit_id = job.deposit_id;

        let outcome = self
            .db
            .transition_deposit(
                deposit_id,
                &[DepositStatus::Pending],
                DepositTransition::processing(),
            )
            .await?;

        match outcome {
            TransitionOutcome::Applied => self.relay_claimed(job, shutdown).await,
            TransitionOutcome::NotFound => {
                warn!(
                    deposit_id = deposit_id.value(),
                    "job references an unknown deposit; dropping"
                );
                Ok(JobVerdict::Done)
            }
            TransitionOutcome::Conflict { actual } if actual.is_final() => {
                debug!(
                    deposit_id = deposit_id.value(),
                    status = %actual,
                    "deposit already settled; dropping job"
                );
                Ok(JobVerdict::Done)
            }
            TransitionOutcome::Conflict {
                actual: DepositStatus::Processing,
            } => self.reconcile_processing(job, shutdown).await,
            TransitionOutcome::Conflict { actual } => {
                debug!(
                    deposit_id = deposit_id.value(),
                    status = %actual,
                    "deposit was rescheduled concurrently; dropping the stale job"
                );
                Ok(JobVerdict::Done)
            }
        }
    }

    /// A job whose deposit is already at processing.
    ///
    /// Either another worker holds it right now, or a previous delivery of
    /// this very job died mid-relay. The destination chain is the arbiter: a
    /// landed release is adopted, a redelivery with nothing landed resumes.
    async fn reconcile_processing(
        &self,
        job: &QueuedJob,
        shutdown: &CancellationToken,
    ) -> RelayResult<JobVerdict> {
        let deposit_id = job.deposit_id;

        if let Some(tx_hash) = self.destination.completed_release(deposit_id).await? {
            info!(
                deposit_id = deposit_id.value(),
                %tx_hash,
                "found a landed release for an in-flight deposit; recording it"
            );

            let outcome = self
                .db
                .transition_deposit(
                    deposit_id,
                    &[DepositStatus::Processing],
                    DepositTransition::completed(tx_hash, Utc::now()),
                )
                .await?;
            if !outcome.is_applied() {
                debug!(
                    deposit_id = deposit_id.value(),
                    "completion was recorded concurrently"
                );
            }

            return Ok(JobVerdict::Done);
        }

        if job.attempts > 1 {
            // Redelivery of our own claim: the previous delivery died after
            // flipping the status but before anything landed. Pick it back up.
            info!(
                deposit_id = deposit_id.value(),
                attempts = job.attempts,
                "resuming an interrupted relay"
            );
            return self.relay_claimed(job, shutdown).await;
        }

        debug!(
            deposit_id = deposit_id.value(),
            "deposit is being relayed elsewhere; dropping the duplicate job"
        );
        Ok(JobVerdict::Done)
    }

    /// The relay proper, entered with the deposit claimed at processing:
    /// wait out the confirmation depth, validate the amount, execute the
    /// release and record the outcome.
    async fn relay_claimed(
        &self,
        job: &QueuedJob,
        shutdown: &CancellationToken,
    ) -> RelayResult<JobVerdict> {
        let payload = &job.payload;
        let deposit_id = job.deposit_id;

        let target = confirmation_target(
            payload.source_block,
            self.policy.source.required_confirmations,
        );
        let gate = await_confirmations(
            self.source.as_ref(),
            target,
            self.config.confirmation_poll_interval,
            shutdown,
        )
        .await?;

        if gate == GateOutcome::Interrupted {
            // Hand the claim back untouched so a restart starts over.
            let outcome = self
                .db
                .transition_deposit(
                    deposit_id,
                    &[DepositStatus::Processing],
                    DepositTransition::released(),
                )
                .await?;
            if !outcome.is_applied() {
                warn!(
                    deposit_id = deposit_id.value(),
                    "could not return an interrupted deposit to pending"
                );
            }

            return Ok(JobVerdict::Interrupted);
        }

        if let Err(violation) = self.policy.limits.bounds_for(&payload.asset).check(payload.amount) {
            let reason = violation.to_string();
            info!(
                deposit_id = deposit_id.value(),
                %reason,
                "deposit rejected by the bridge limits"
            );

            let outcome = self
                .db
                .transition_deposit(
                    deposit_id,
                    &[DepositStatus::Processing],
                    DepositTransition::failed(reason),
                )
                .await?;
            if !outcome.is_applied() {
                warn!(
                    deposit_id = deposit_id.value(),
                    "limit rejection lost a transition race"
                );
            }

            return Ok(JobVerdict::Done);
        }

        let submitted = {
            let lock = self.locks.for_signer(self.destination.signer());
            let _guard = lock.lock().await;

            // A predecessor may have sent this release and died before
            // recording it. Checked under the signer lock so the probe and
            // the submission are one atomic step.
            match self.destination.completed_release(deposit_id).await? {
                Some(tx_hash) => {
                    info!(
                        deposit_id = deposit_id.value(),
                        %tx_hash,
                        "release already on chain; skipping submission"
                    );
                    Ok(Receipt {
                        tx_hash,
                        success: true,
                    })
                }
                None => match payload.asset {
                    AssetKind::Native => self.destination.release_native(payload).await,
                    AssetKind::Token(token) => self.destination.mint_token(token, payload).await,
                },
            }
        };

        let receipt = match submitted {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(deposit_id = deposit_id.value(), %err, "release submission failed");
                return self
                    .retry_or_fail(deposit_id, payload, format!("submission failed: {err}"))
                    .await;
            }
        };

        if !receipt.success {
            warn!(
                deposit_id = deposit_id.value(),
                tx_hash = %receipt.tx_hash,
                "release transaction reverted"
            );
            return self
                .retry_or_fail(
                    deposit_id,
                    payload,
                    format!("release transaction {} reverted", receipt.tx_hash),
                )
                .await;
        }

        let outcome = self
            .db
            .transition_deposit(
                deposit_id,
                &[DepositStatus::Processing],
                DepositTransition::completed(receipt.tx_hash, Utc::now()),
            )
            .await?;

        match outcome {
            TransitionOutcome::Applied => {
                info!(
                    deposit_id = deposit_id.value(),
                    tx_hash = %receipt.tx_hash,
                    "deposit relayed"
                );
            }
            other => {
                warn!(
                    deposit_id = deposit_id.value(),
                    ?other,
                    "release landed but the deposit record had moved on"
                );
            }
        }

        Ok(JobVerdict::Done)
    }

    /// Applies the deposit retry policy after a failed execution attempt:
    /// schedules another cycle while the budget lasts, fails the deposit
    /// terminally once it is spent.
    async fn retry_or_fail(
        &self,
        deposit_id: DepositId,
        payload: &RelayJob,
        reason: String,
    ) -> RelayResult<JobVerdict> {
        let Some(deposit) = self.db.deposit(deposit_id).await? else {
            warn!(
                deposit_id = deposit_id.value(),
                "deposit vanished while handling an execution failure"
            );
            return Ok(JobVerdict::Done);
        };

        if deposit.retry_count >= self.policy.retry.max_retries {
            let outcome = self
                .db
                .transition_deposit(
                    deposit_id,
                    &[DepositStatus::Processing],
                    DepositTransition::failed(reason.clone()),
                )
                .await?;
            if outcome.is_applied() {
                warn!(
                    deposit_id = deposit_id.value(),
                    retries = deposit.retry_count,
                    %reason,
                    "deposit failed terminally"
                );
            }

            return Ok(JobVerdict::Done);
        }

        let outcome = self
            .db
            .transition_deposit(
                deposit_id,
                &[DepositStatus::Processing],
                DepositTransition::retry_pending(reason.clone()),
            )
            .await?;
        if !outcome.is_applied() {
            debug!(
                deposit_id = deposit_id.value(),
                "retry was superseded by a concurrent transition"
            );
            return Ok(JobVerdict::Done);
        }

        let retry_number = deposit.retry_count + 1;
        let delay = self.policy.retry.backoff_delay(retry_number);
        self.queue.enqueue_delayed(payload.clone(), delay).await?;

        info!(
            deposit_id = deposit_id.value(),
            retry = retry_number,
            ?delay,
            %reason,
            "deposit scheduled for another attempt"
        );

        Ok(JobVerdict::Done)
    }
}

/// First head height at which a deposit from `source_block` counts as
/// confirmed.
const fn confirmation_target(source_block: BlockHeight, required_confirmations: u64) -> BlockHeight {
    source_block.saturating_add(required_confirmations)
}

/// Polls the source head until it reaches `target` or shutdown wins the race.
///
/// The depth is re-checked against the live chain on every pass; nothing is
/// cached from the claim.
async fn await_confirmations<S: SourceChain>(
    source: &S,
    target: BlockHeight,
    poll_interval: Duration,
    shutdown: &CancellationToken,
) -> RelayResult<GateOutcome> {
    loop {
        let height = source.block_height().await?;
        if height >= target {
            return Ok(GateOutcome::Confirmed);
        }

        debug!(height, target, "deposit not buried deep enough yet");

        tokio::select! {
            biased;
            () = shutdown.cancelled() => return Ok(GateOutcome::Interrupted),
            () = sleep(poll_interval) => {}
        }
    }
}
