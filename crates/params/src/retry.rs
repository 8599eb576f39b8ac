//! Deposit-level retry policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::default::{MAX_RETRIES, RETRY_BASE_DELAY};

/// How often and how patiently a failed relay attempt is re-scheduled.
///
/// This governs the deposit-level `retry_count` ceiling; the queue keeps its own,
/// independent attempt ceiling for handler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryParams {
    /// Number of retry cycles before a deposit fails terminally.
    ///
    /// A deposit reaches `failed` with `retry_count` equal to exactly this value
    /// when every execution attempt fails.
    pub max_retries: u32,

    /// Base delay for the exponential backoff between retry cycles.
    pub base_delay: Duration,
}

impl RetryParams {
    /// Backoff delay before the given retry cycle, 1-indexed.
    ///
    /// Doubles per cycle from `base_delay`, with the exponent clamped so the delay
    /// saturates instead of overflowing.
    pub fn backoff_delay(&self, retry_number: u32) -> Duration {
        let exponent = retry_number.saturating_sub(1).min(16);

        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: RETRY_BASE_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_cycle() {
        let retry = RetryParams {
            max_retries: 5,
            base_delay: Duration::from_secs(10),
        };

        assert_eq!(retry.backoff_delay(1), Duration::from_secs(10));
        assert_eq!(retry.backoff_delay(2), Duration::from_secs(20));
        assert_eq!(retry.backoff_delay(3), Duration::from_secs(40));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let retry = RetryParams {
            max_retries: u32::MAX,
            base_delay: Duration::from_secs(3600),
        };

        let big = retry.backoff_delay(u32::MAX);
        assert_eq!(big, retry.backoff_delay(17), "exponent must clamp");
    }

    #[test]
    fn test_retry_params_serde() {
        let params = RetryParams::default();
        let serialized = toml::to_string(&params).unwrap();

        let deserialized: RetryParams = toml::from_str(&serialized).unwrap();

        assert_eq!(params, deserialized);

        let params_toml = r#"
            max_retries = 5
            base_delay = { secs = 60, nanos = 0 }
        "#;
        assert!(
            toml::from_str::<RetryParams>(params_toml).is_ok(),
            "must be able to deserialize RetryParams from a toml"
        );
    }
}
