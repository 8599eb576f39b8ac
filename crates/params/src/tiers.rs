//! Priority tier thresholds for queue scheduling.

use ethnum::U256;
use serde::{Deserialize, Serialize};
use trestle_primitives::{amount, job::JobPriority};

use crate::default::{LARGE_PRIORITY_MIN, MEDIUM_PRIORITY_MIN};

/// Amount thresholds that place a deposit into a scheduling tier.
///
/// Scheduling preference only; no correctness property depends on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityTiers {
    /// Amounts at or above this are at least medium priority.
    #[serde(with = "amount::dec_str")]
    pub medium_min: U256,

    /// Amounts at or above this are large priority.
    #[serde(with = "amount::dec_str")]
    pub large_min: U256,
}

impl PriorityTiers {
    /// Places an amount into its scheduling tier.
    pub fn classify(&self, amount: U256) -> JobPriority {
        if amount >= self.large_min {
            JobPriority::Large
        } else if amount >= self.medium_min {
            JobPriority::Medium
        } else {
            JobPriority::Default
        }
    }
}

impl Default for PriorityTiers {
    fn default() -> Self {
        Self {
            medium_min: MEDIUM_PRIORITY_MIN,
            large_min: LARGE_PRIORITY_MIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_respects_the_thresholds() {
        let tiers = PriorityTiers {
            medium_min: U256::new(100),
            large_min: U256::new(1_000),
        };

        assert_eq!(tiers.classify(U256::new(99)), JobPriority::Default);
        assert_eq!(tiers.classify(U256::new(100)), JobPriority::Medium);
        assert_eq!(tiers.classify(U256::new(999)), JobPriority::Medium);
        assert_eq!(tiers.classify(U256::new(1_000)), JobPriority::Large);
        assert_eq!(tiers.classify(U256::MAX), JobPriority::Large);
    }

    #[test]
    fn test_priority_tiers_serde() {
        let tiers = PriorityTiers::default();
        let serialized = toml::to_string(&tiers).unwrap();

        let deserialized: PriorityTiers = toml::from_str(&serialized).unwrap();

        assert_eq!(tiers, deserialized);
    }
}
