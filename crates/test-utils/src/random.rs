//! Module to generate arbitrary values for testing.

use trestle_primitives::types::{Address, TxHash};

/// Generates a random address.
pub fn generate_address() -> Address {
    Address::new(rand::random::<[u8; 20]>())
}

/// Generates a random transaction hash.
pub fn generate_tx_hash() -> TxHash {
    TxHash::new(rand::random::<[u8; 32]>())
}
