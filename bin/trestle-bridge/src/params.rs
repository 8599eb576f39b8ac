//! Deployment parameters for the relay.

use serde::{Deserialize, Serialize};
use trestle_bridge_params::prelude::{
    BridgeLimits, DestChainParams, PriorityTiers, RetryParams, SourceChainParams,
};

/// The deployment-wide parameters that dictate which deposits are relayed and how.
///
/// Every relay node pointed at the same bridge contracts must run with identical
/// values here; a node with a different confirmation depth or different limits
/// will disagree with its peers about which deposits are releasable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Params {
    /// Parameters of the source ledger deposits are observed on.
    pub source: SourceChainParams,

    /// Parameters of the destination ledger releases are executed on.
    pub dest: DestChainParams,

    /// Amount bounds a deposit must satisfy before it is relayed.
    pub limits: BridgeLimits,

    /// The deposit-level retry policy.
    pub retry: RetryParams,

    /// Amount thresholds that map deposits onto queue priority tiers.
    pub tiers: PriorityTiers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_serde_toml() {
        let params = r#"
            [source]
            chain_id = 11155111
            bridge_contract = "0x00000000000000000000000000000000000000aa"
            required_confirmations = 12
            block_time = { secs = 12, nanos = 0 }

            [dest]
            chain_id = 205205
            bridge_contract = "0x00000000000000000000000000000000000000bb"
            gas_limit = 500000

            [limits.default]
            min = "1000000000000000"
            max = "1000000000000000000000"

            [limits.per_token."0x00000000000000000000000000000000000000cc"]
            min = "1000000"
            max = "1000000000000"

            [retry]
            max_retries = 3
            base_delay = { secs = 60, nanos = 0 }

            [tiers]
            medium_min = "1000000000000000000"
            large_min = "100000000000000000000"
        "#;

        let params = toml::from_str::<Params>(params);
        assert!(
            params.is_ok(),
            "must be able to deserialize params from toml but got: {}",
            params.unwrap_err()
        );

        let params = params.unwrap();
        assert_eq!(params.source.required_confirmations, 12);
        assert_eq!(params.limits.per_token.len(), 1);

        let serialized = toml::to_string(&params).unwrap();
        let deserialized = toml::from_str::<Params>(&serialized).unwrap();
        assert_eq!(
            deserialized, params,
            "must be able to serialize and deserialize params to toml"
        );
    }
}
