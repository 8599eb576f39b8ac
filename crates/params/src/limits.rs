//! Bridgeable amount bounds, with optional per-token overrides.

use std::collections::BTreeMap;

use ethnum::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trestle_primitives::{amount, deposit::AssetKind, types::Address};

use crate::default::{MAX_BRIDGE_AMOUNT, MIN_BRIDGE_AMOUNT};

/// An inclusive `[min, max]` window of bridgeable amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountBounds {
    /// Smallest amount the bridge will relay.
    #[serde(with = "amount::dec_str")]
    pub min: U256,

    /// Largest amount the bridge will relay.
    #[serde(with = "amount::dec_str")]
    pub max: U256,
}

impl AmountBounds {
    /// Checks an amount against the window.
    ///
    /// A violation is permanent for the deposit: neither the amount nor the bounds
    /// can change, so the caller must not schedule a retry for it.
    pub fn check(&self, amount: U256) -> Result<(), BoundsViolation> {
        if amount < self.min {
            return Err(BoundsViolation::BelowMinimum {
                amount,
                min: self.min,
            });
        }

        if amount > self.max {
            return Err(BoundsViolation::AboveMaximum {
                amount,
                max: self.max,
            });
        }

        Ok(())
    }
}

impl Default for AmountBounds {
    fn default() -> Self {
        Self {
            min: MIN_BRIDGE_AMOUNT,
            max: MAX_BRIDGE_AMOUNT,
        }
    }
}

/// Why an amount was rejected by [`AmountBounds::check`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundsViolation {
    /// The amount is below the configured minimum.
    #[error("amount {amount} below minimum bridge amount {min}")]
    BelowMinimum {
        /// The rejected amount.
        amount: U256,

        /// The configured minimum.
        min: U256,
    },

    /// The amount is above the configured maximum.
    #[error("amount {amount} above maximum bridge amount {max}")]
    AboveMaximum {
        /// The rejected amount.
        amount: U256,

        /// The configured maximum.
        max: U256,
    },
}

/// The full validation surface: a global default window plus per-token overrides.
///
/// The native asset's override, when present, is keyed by the zero address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeLimits {
    /// Window applied when no per-token override exists.
    pub default: AmountBounds,

    /// Per-token overrides keyed by token contract address.
    #[serde(default)]
    pub per_token: BTreeMap<Address, AmountBounds>,
}

impl BridgeLimits {
    /// The bounds that apply to the given asset.
    pub fn bounds_for(&self, asset: &AssetKind) -> &AmountBounds {
        let key = asset.token_address().unwrap_or(Address::ZERO);

        self.per_token.get(&key).unwrap_or(&self.default)
    }
}
