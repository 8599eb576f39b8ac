//! Per-side chain parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use trestle_primitives::types::Address;

use crate::default::{
    DEST_CHAIN_ID, GAS_LIMIT, REQUIRED_CONFIRMATIONS, SOURCE_BLOCK_TIME, SOURCE_CHAIN_ID,
};

/// Parameters of the source ledger that deposits are observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceChainParams {
    /// Chain id of the source ledger, used to sanity-check the connected RPC.
    pub chain_id: u64,

    /// Address of the bridge contract emitting deposit events.
    pub bridge_contract: Address,

    /// Number of confirmations a deposit block needs before the relay may act on it.
    ///
    /// This fixed depth is the only reorg protection the pipeline has.
    pub required_confirmations: u64,

    /// Expected block interval, used to estimate how long a fresh deposit will
    /// take to confirm. Scheduling hint only.
    pub block_time: Duration,
}

impl SourceChainParams {
    /// Rough time until a fresh deposit has enough confirmations.
    pub fn confirmation_eta(&self) -> Duration {
        self.block_time
            .saturating_mul(u32::try_from(self.required_confirmations).unwrap_or(u32::MAX))
    }
}

impl Default for SourceChainParams {
    fn default() -> Self {
        Self {
            chain_id: SOURCE_CHAIN_ID,
            bridge_contract: Address::ZERO,
            required_confirmations: REQUIRED_CONFIRMATIONS,
            block_time: SOURCE_BLOCK_TIME,
        }
    }
}

/// Parameters of the destination ledger that releases are executed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestChainParams {
    /// Chain id of the destination ledger.
    pub chain_id: u64,

    /// Address of the bridge contract the release calls target.
    pub bridge_contract: Address,

    /// Gas ceiling applied to every release call.
    pub gas_limit: u64,
}

impl Default for DestChainParams {
    fn default() -> Self {
        Self {
            chain_id: DEST_CHAIN_ID,
            bridge_contract: Address::ZERO,
            gas_limit: GAS_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_params_serde() {
        let params = SourceChainParams::default();
        let serialized = toml::to_string(&params).unwrap();

        let deserialized: SourceChainParams = toml::from_str(&serialized).unwrap();

        assert_eq!(params, deserialized);

        let params_toml = r#"
            chain_id = 11155111
            bridge_contract = "0x00000000000000000000000000000000000000aa"
            required_confirmations = 6
            block_time = { secs = 12, nanos = 0 }
        "#;
        assert!(
            toml::from_str::<SourceChainParams>(params_toml).is_ok(),
            "must be able to deserialize SourceChainParams from a toml"
        );
    }

    #[test]
    fn confirmation_eta_scales_with_depth() {
        let params = SourceChainParams {
            required_confirmations: 12,
            block_time: Duration::from_secs(12),
            ..Default::default()
        };

        assert_eq!(params.confirmation_eta(), Duration::from_secs(144));
    }
}
