//! The deposit store trait: the sole source of truth for deposit state.

use async_trait::async_trait;
use trestle_primitives::{
    deposit::{Deposit, DepositStats, DepositStatus, DepositTransition, NewDeposit, Page},
    types::{Address, DepositId},
};

use crate::errors::DbResult;

/// Outcome of [`DepositDb::insert_deposit_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The record did not exist and was inserted.
    Created,

    /// A record with this deposit id already exists; nothing was written.
    AlreadyExists,
}

impl CreateOutcome {
    /// Whether a new record was inserted.
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }
}

/// Outcome of [`DepositDb::transition_deposit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The expected-status guard held and the update was applied.
    Applied,

    /// The deposit exists but its status did not match the guard; nothing was
    /// written. Carries the status actually found.
    Conflict {
        /// The status the deposit was actually in.
        actual: DepositStatus,
    },

    /// No deposit with this id exists.
    NotFound,
}

impl TransitionOutcome {
    /// Whether the update was applied.
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Durable keyed store of every observed deposit.
///
/// The two mutation primitives are atomic on their own: concurrent
/// `insert_deposit_if_absent` calls for one id insert exactly once, and
/// concurrent guarded transitions on one id can never both succeed with
/// conflicting outcomes. Callers never read-then-write around them.
#[async_trait]
pub trait DepositDb {
    /// Inserts a deposit record if none with this id exists yet.
    ///
    /// This is the pipeline's sole deduplication point: the same event delivered
    /// any number of times yields exactly one record.
    async fn insert_deposit_if_absent(&self, deposit: &NewDeposit) -> DbResult<CreateOutcome>;

    /// Applies a status transition, guarded by an expected-status set.
    ///
    /// An empty `expected` slice applies the transition unconditionally. The
    /// guard evaluation and the update happen atomically.
    async fn transition_deposit(
        &self,
        deposit_id: DepositId,
        expected: &[DepositStatus],
        transition: DepositTransition,
    ) -> DbResult<TransitionOutcome>;

    /// Fetches a single deposit by id.
    async fn deposit(&self, deposit_id: DepositId) -> DbResult<Option<Deposit>>;

    /// Lists a user's deposits, newest first.
    async fn deposits_by_user(&self, user: &Address, page: Page) -> DbResult<Vec<Deposit>>;

    /// Lists every deposit currently in the given status, oldest id first.
    ///
    /// Used by startup recovery to find records stuck at processing.
    async fn deposits_in_status(&self, status: DepositStatus) -> DbResult<Vec<Deposit>>;

    /// Aggregate counts by status plus the completed volume.
    async fn deposit_stats(&self) -> DbResult<DepositStats>;
}
