//! Fixture deposits and deposit events.

use ethnum::U256;
use trestle_primitives::{
    deposit::NewDeposit,
    event::DepositEvent,
    job::RelayJob,
    types::{Address, DepositId},
};

use crate::random::{generate_address, generate_tx_hash};

/// Block the fixture events claim to come from.
pub const FIXTURE_BLOCK: u64 = 100;

/// One whole unit of an 18-decimals asset.
pub const ONE_ETHER: U256 = U256::new(1_000_000_000_000_000_000);

/// A native-asset deposit event with the given id, one ether at block
/// [`FIXTURE_BLOCK`], and a random user and transaction hash.
pub fn generate_deposit_event(deposit_id: u64) -> DepositEvent {
    DepositEvent {
        deposit_id: DepositId(deposit_id),
        user: generate_address(),
        token: None,
        amount: ONE_ETHER,
        nonce: Some(deposit_id),
        timestamp: 1_700_000_000,
        tx_hash: generate_tx_hash(),
        block_number: FIXTURE_BLOCK,
    }
}

/// The insertable record for a fixture native deposit.
pub fn generate_new_deposit(deposit_id: u64) -> NewDeposit {
    generate_deposit_event(deposit_id).to_new_deposit()
}

/// The insertable record for a fixture token deposit with an explicit amount.
pub fn generate_token_deposit(deposit_id: u64, token: Address, amount: U256) -> NewDeposit {
    let mut event = generate_deposit_event(deposit_id);
    event.token = Some(token);
    event.amount = amount;

    event.to_new_deposit()
}

/// The relay payload for a fixture native deposit.
pub fn generate_relay_job(deposit_id: u64) -> RelayJob {
    RelayJob::from(&generate_new_deposit(deposit_id))
}
