//! The deposit event as delivered by the source chain.

use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::{
    deposit::{AssetKind, NewDeposit},
    types::{Address, BlockHeight, DepositId, TxHash},
};

/// One deposit event from the source contract, either live or from a backfill scan.
///
/// The `token` field carries the raw wire encoding: absent or zero means the native
/// asset. Consumers should go through [`DepositEvent::asset`] instead of reading it
/// directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    /// The chain-assigned deposit id.
    pub deposit_id: DepositId,

    /// The depositing user.
    pub user: Address,

    /// Raw token field from the event log. `None` or the zero address denote the
    /// native asset.
    pub token: Option<Address>,

    /// Deposited amount in the asset's smallest unit.
    #[serde(with = "crate::amount::dec_str")]
    pub amount: U256,

    /// Anti-replay tag emitted by the source contract, when present.
    pub nonce: Option<u64>,

    /// Source-chain timestamp of the deposit, unix seconds.
    pub timestamp: u64,

    /// Hash of the transaction that emitted the event.
    pub tx_hash: TxHash,

    /// Block in which the event was emitted.
    pub block_number: BlockHeight,
}

impl DepositEvent {
    /// The asset this event deposits, with the native sentinel resolved.
    pub fn asset(&self) -> AssetKind {
        AssetKind::from_wire(self.token)
    }

    /// Builds the insertable deposit record for this event.
    pub fn to_new_deposit(&self) -> NewDeposit {
        NewDeposit {
            deposit_id: self.deposit_id,
            user: self.user,
            asset: self.asset(),
            amount: self.amount,
            nonce: self.nonce,
            source_tx_hash: self.tx_hash,
            source_block: self.block_number,
            source_timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_converts_to_a_pending_record_shape() {
        let event = DepositEvent {
            deposit_id: DepositId(7),
            user: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
                .parse()
                .expect("must parse"),
            token: Some(Address::ZERO),
            amount: U256::new(42),
            nonce: Some(3),
            timestamp: 1_700_000_000,
            tx_hash: TxHash::new([1u8; 32]),
            block_number: 100,
        };

        let new_deposit = event.to_new_deposit();

        assert_eq!(new_deposit.deposit_id, DepositId(7));
        assert_eq!(new_deposit.asset, AssetKind::Native, "zero token must map to native");
        assert_eq!(new_deposit.source_block, 100);
        assert_eq!(new_deposit.amount, U256::new(42));
    }

    #[test]
    fn event_serde_uses_decimal_amounts() {
        let event = DepositEvent {
            deposit_id: DepositId(1),
            user: Address::ZERO,
            token: None,
            amount: "1000000000000000000".parse().expect("must parse"),
            nonce: None,
            timestamp: 0,
            tx_hash: TxHash::new([0u8; 32]),
            block_number: 1,
        };

        let encoded = serde_json::to_string(&event).expect("must serialize");
        assert!(
            encoded.contains(r#""amount":"1000000000000000000""#),
            "wire amount must be a decimal string, got {encoded}"
        );
    }
}
