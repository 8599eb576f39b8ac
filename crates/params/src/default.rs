//! Default values for the bridge parameters.

use std::time::Duration;

use ethnum::U256;

/// Default number of source-chain confirmations before a deposit may be relayed.
pub(crate) const REQUIRED_CONFIRMATIONS: u64 = 12;

/// Default gas ceiling for destination-chain release calls.
pub(crate) const GAS_LIMIT: u64 = 500_000;

/// Default minimum bridgeable amount, in the asset's smallest unit.
pub(crate) const MIN_BRIDGE_AMOUNT: U256 = U256::new(1_000_000_000_000);

/// Default maximum bridgeable amount, in the asset's smallest unit.
pub(crate) const MAX_BRIDGE_AMOUNT: U256 = U256::new(1_000_000_000_000_000_000_000_000);

/// Default lower edge of the medium priority tier.
pub(crate) const MEDIUM_PRIORITY_MIN: U256 = U256::new(1_000_000_000_000_000_000);

/// Default lower edge of the large priority tier.
pub(crate) const LARGE_PRIORITY_MIN: U256 = U256::new(100_000_000_000_000_000_000);

/// Default ceiling on deposit-level retry cycles before a deposit fails terminally.
pub(crate) const MAX_RETRIES: u32 = 3;

/// Default base delay for the deposit-level retry backoff.
pub(crate) const RETRY_BASE_DELAY: Duration = Duration::from_secs(30);

/// Default chain id of the source ledger.
pub(crate) const SOURCE_CHAIN_ID: u64 = 1;

/// Default source-chain block interval, used to estimate confirmation wait times.
pub(crate) const SOURCE_BLOCK_TIME: Duration = Duration::from_secs(12);

/// Default chain id of the destination ledger.
pub(crate) const DEST_CHAIN_ID: u64 = 2;
