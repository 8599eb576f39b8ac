//! Operator interventions on individual deposits.

use std::sync::Arc;

use tracing::info;
use trestle_db::{
    deposits::{DepositDb, TransitionOutcome},
    queue::QueueDb,
};
use trestle_primitives::{
    deposit::{DepositStatus, DepositTransition},
    job::RelayJob,
    types::DepositId,
};

use crate::{errors::RelayResult, queue::JobQueue};

/// Outcome of an operator retry request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The deposit was returned to pending and an immediate job scheduled.
    Scheduled,

    /// Only failed deposits can be retried.
    NotFailed {
        /// The status the deposit was actually in.
        actual: DepositStatus,
    },

    /// No deposit with the requested id exists.
    NotFound,
}

/// Outcome of an operator cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The deposit is now cancelled.
    Cancelled,

    /// The deposit has progressed past the point of cancellation.
    NotCancellable {
        /// The status the deposit was actually in.
        actual: DepositStatus,
    },

    /// No deposit with the requested id exists.
    NotFound,
}

/// Operator-facing deposit interventions, exposed over the admin RPC.
#[derive(Debug)]
pub struct AdminOps<DB> {
    db: Arc<DB>,
    queue: JobQueue<DB>,
}

impl<DB> AdminOps<DB>
where
    DB: DepositDb + QueueDb + Send + Sync,
{
    /// Builds the intervention handle.
    pub fn new(db: Arc<DB>, queue: JobQueue<DB>) -> Self {
        Self { db, queue }
    }

    /// Returns a failed deposit to pending with its retry bookkeeping cleared
    /// and schedules an immediate relay attempt.
    pub async fn retry_deposit(&self, deposit_id: DepositId) -> RelayResult<RetryOutcome> {
        let outcome = self
            .db
            .transition_deposit(
                deposit_id,
                &[DepositStatus::Failed],
                DepositTransition::pending_for_retry(),
            )
            .await?;

        match outcome {
            TransitionOutcome::Applied => {}
            TransitionOutcome::Conflict { actual } => {
                return Ok(RetryOutcome::NotFailed { actual })
            }
            TransitionOutcome::NotFound => return Ok(RetryOutcome::NotFound),
        }

        let Some(deposit) = self.db.deposit(deposit_id).await? else {
            return Ok(RetryOutcome::NotFound);
        };

        let job_id = self.queue.enqueue_now(RelayJob::from(&deposit)).await?;
        info!(
            deposit_id = deposit_id.value(),
            %job_id,
            "operator retry scheduled"
        );

        Ok(RetryOutcome::Scheduled)
    }

    /// Withdraws a deposit that is not currently being relayed.
    ///
    /// Pending deposits are cancellable because their job, once claimed, will
    /// find the final status and drop itself.
    pub async fn cancel_deposit(&self, deposit_id: DepositId) -> RelayResult<CancelOutcome> {
        let outcome = self
            .db
            .transition_deposit(
                deposit_id,
                &[DepositStatus::Pending, DepositStatus::Failed],
                DepositTransition::cancelled(),
            )
            .await?;

        Ok(match outcome {
            TransitionOutcome::Applied => {
                info!(deposit_id = deposit_id.value(), "deposit cancelled by operator");
                CancelOutcome::Cancelled
            }
            TransitionOutcome::Conflict { actual } => CancelOutcome::NotCancellable { actual },
            TransitionOutcome::NotFound => CancelOutcome::NotFound,
        })
    }
}
