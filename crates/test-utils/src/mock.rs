//! In-memory chain clients with scriptable behavior.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use trestle_chain::{
    errors::{ClientError, ClientResult},
    subscription::DepositSubscription,
    traits::{DestinationChain, Receipt, SourceChain},
};
use trestle_primitives::{
    event::DepositEvent,
    job::RelayJob,
    types::{Address, BlockHeight, DepositId, TxHash},
};

/// Scripted outcome for one release submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The transaction lands and executes, yielding this hash.
    Success(TxHash),

    /// The transaction lands but reverts on chain.
    Revert,

    /// The node cannot be reached; whether the transaction went out is unknown.
    Disconnect,
}

#[derive(Debug, Default)]
struct State {
    height: BlockHeight,
    height_script: VecDeque<BlockHeight>,
    height_polls: usize,
    failing_height_polls: usize,
    events: Vec<DepositEvent>,
    event_queries: Vec<(BlockHeight, BlockHeight)>,
    feeds: Vec<mpsc::UnboundedSender<DepositEvent>>,
    failing_subscribes: usize,
    subscribe_calls: usize,
    submit_script: VecDeque<SubmitOutcome>,
    submissions: Vec<RelayJob>,
    completions: BTreeMap<DepositId, TxHash>,
    in_flight: usize,
    max_in_flight: usize,
}

/// In-memory test double for both chain traits.
///
/// Clones share state, so a test keeps one handle for scripting and observation
/// while the pipeline under test owns the others.
#[derive(Debug, Clone)]
pub struct MockChain {
    state: Arc<Mutex<State>>,
    signer: Address,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// Creates a chain at height zero with no deposits and an empty script.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            signer: Address::new([0x51; 20]),
        }
    }

    /// The deterministic release hash an unscripted successful submission
    /// reports for this deposit.
    pub fn release_hash(deposit_id: DepositId) -> TxHash {
        let mut bytes = [0xaa_u8; 32];
        bytes[..8].copy_from_slice(&deposit_id.value().to_be_bytes());

        TxHash::new(bytes)
    }

    /// Sets the chain head height.
    pub fn set_height(&self, height: BlockHeight) {
        self.state.lock().height = height;
    }

    /// Queues heights to serve on upcoming polls, one each, before settling on
    /// the last one.
    pub fn script_heights(&self, heights: impl IntoIterator<Item = BlockHeight>) {
        self.state.lock().height_script.extend(heights);
    }

    /// Makes the next `count` height polls fail at the transport level.
    pub fn fail_next_height_polls(&self, count: usize) {
        self.state.lock().failing_height_polls += count;
    }

    /// Adds a deposit event to chain history and pushes it to live feeds.
    pub fn push_deposit(&self, event: DepositEvent) {
        let mut state = self.state.lock();
        state.events.push(event.clone());
        state.feeds.retain(|feed| feed.send(event.clone()).is_ok());
    }

    /// Severs every live deposit feed, as a dropped connection would.
    pub fn disconnect_feeds(&self) {
        self.state.lock().feeds.clear();
    }

    /// Makes the next `count` subscription attempts fail.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.state.lock().failing_subscribes += count;
    }

    /// Number of subscription attempts made so far.
    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribe_calls
    }

    /// Every inclusive block range passed to a history query, in call order.
    pub fn event_queries(&self) -> Vec<(BlockHeight, BlockHeight)> {
        self.state.lock().event_queries.clone()
    }

    /// Queues outcomes for upcoming submissions; unscripted submissions succeed.
    pub fn script_submissions(&self, outcomes: impl IntoIterator<Item = SubmitOutcome>) {
        self.state.lock().submit_script.extend(outcomes);
    }

    /// Every payload submitted so far, in submission order.
    pub fn submissions(&self) -> Vec<RelayJob> {
        self.state.lock().submissions.clone()
    }

    /// Marks a release as already landed, as a predecessor that crashed after
    /// submitting would have left it.
    pub fn record_completion(&self, deposit_id: DepositId, tx_hash: TxHash) {
        self.state.lock().completions.insert(deposit_id, tx_hash);
    }

    /// The most submissions that were ever in flight at once.
    pub fn max_in_flight_submissions(&self) -> usize {
        self.state.lock().max_in_flight
    }

    /// Number of height polls served so far, failures included.
    pub fn height_polls(&self) -> usize {
        self.state.lock().height_polls
    }

    async fn submit(&self, job: &RelayJob) -> ClientResult<Receipt> {
        let outcome = {
            let mut state = self.state.lock();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);

            state
                .submit_script
                .pop_front()
                .unwrap_or_else(|| SubmitOutcome::Success(Self::release_hash(job.deposit_id)))
        };

        // Hold the in-flight slot across an await point so that overlapping
        // submissions are observable.
        tokio::time::sleep(Duration::from_millis(1)).await;

        let mut state = self.state.lock();
        state.in_flight -= 1;
        state.submissions.push(job.clone());

        match outcome {
            SubmitOutcome::Success(tx_hash) => {
                state.completions.insert(job.deposit_id, tx_hash);

                Ok(Receipt {
                    tx_hash,
                    success: true,
                })
            }
            SubmitOutcome::Revert => Ok(Receipt {
                tx_hash: Self::release_hash(job.deposit_id),
                success: false,
            }),
            SubmitOutcome::Disconnect => {
                Err(ClientError::Transport("node unreachable".to_owned()))
            }
        }
    }
}

#[async_trait]
impl SourceChain for MockChain {
    async fn block_height(&self) -> ClientResult<BlockHeight> {
        let mut state = self.state.lock();
        state.height_polls += 1;

        if state.failing_height_polls > 0 {
            state.failing_height_polls -= 1;
            return Err(ClientError::Transport("height poll failed".to_owned()));
        }

        if let Some(next) = state.height_script.pop_front() {
            state.height = next;
        }

        Ok(state.height)
    }

    async fn deposit_events(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> ClientResult<Vec<DepositEvent>> {
        let mut state = self.state.lock();
        state.event_queries.push((from, to));

        Ok(state
            .events
            .iter()
            .filter(|event| event.block_number >= from && event.block_number <= to)
            .cloned()
            .collect())
    }

    async fn subscribe_deposits(&self) -> ClientResult<DepositSubscription> {
        let mut state = self.state.lock();
        state.subscribe_calls += 1;

        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            return Err(ClientError::Transport("node unreachable".to_owned()));
        }

        let (sender, feed) = DepositSubscription::channel();
        state.feeds.push(sender);

        Ok(feed)
    }
}

#[async_trait]
impl DestinationChain for MockChain {
    async fn release_native(&self, job: &RelayJob) -> ClientResult<Receipt> {
        self.submit(job).await
    }

    async fn mint_token(&self, _token: Address, job: &RelayJob) -> ClientResult<Receipt> {
        self.submit(job).await
    }

    async fn completed_release(&self, deposit_id: DepositId) -> ClientResult<Option<TxHash>> {
        Ok(self.state.lock().completions.get(&deposit_id).copied())
    }

    fn signer(&self) -> Address {
        self.signer
    }
}
