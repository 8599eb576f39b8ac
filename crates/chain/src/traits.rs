//! The capabilities the relay needs from each side of the bridge.
//!
//! The pipeline is written entirely against these traits; production wires in
//! the WebSocket clients from [`crate::rpc`], tests wire in mocks.

use async_trait::async_trait;
use trestle_primitives::{
    event::DepositEvent,
    job::RelayJob,
    types::{Address, BlockHeight, DepositId, TxHash},
};

use crate::{errors::ClientResult, subscription::DepositSubscription};

/// Outcome of a mined release submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// Destination transaction hash.
    pub tx_hash: TxHash,

    /// Whether the transaction executed successfully. A mined transaction can
    /// still revert.
    pub success: bool,
}

/// Read access to the chain deposits originate on.
#[async_trait]
pub trait SourceChain: Send + Sync {
    /// The current chain head height.
    async fn block_height(&self) -> ClientResult<BlockHeight>;

    /// Deposit events emitted in the inclusive block range.
    async fn deposit_events(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> ClientResult<Vec<DepositEvent>>;

    /// Opens a live feed of deposit events from the current head onward.
    async fn subscribe_deposits(&self) -> ClientResult<DepositSubscription>;
}

/// Write access to the chain deposits are released on.
///
/// For every submission an `Ok` receipt means the transaction landed on chain,
/// successfully or reverted; an error means it may or may not have been sent.
/// Callers treat the error case as unknown and probe [`Self::completed_release`]
/// before ever submitting the same deposit again.
#[async_trait]
pub trait DestinationChain: Send + Sync {
    /// Releases the native asset to the job's user and waits for the
    /// transaction to be mined.
    async fn release_native(&self, job: &RelayJob) -> ClientResult<Receipt>;

    /// Mints the wrapped form of `token` to the job's user and waits for the
    /// transaction to be mined.
    async fn mint_token(&self, token: Address, job: &RelayJob) -> ClientResult<Receipt>;

    /// Looks up whether a successful release for this deposit id already landed.
    async fn completed_release(&self, deposit_id: DepositId) -> ClientResult<Option<TxHash>>;

    /// The account submissions are signed with.
    fn signer(&self) -> Address;
}
