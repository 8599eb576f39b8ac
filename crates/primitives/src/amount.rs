//! Helpers for the 256-bit deposit amounts.
//!
//! Amounts cross every boundary (chain events, the store, the queue payload, the
//! RPC surface) as base-10 strings so that values beyond 64 bits are never
//! truncated by an intermediate integer type.

use ethnum::U256;

use crate::errors::ParseError;

/// Parses a base-10 string into a [`U256`].
pub fn parse_decimal(s: &str) -> Result<U256, ParseError> {
    U256::from_str_radix(s.trim(), 10).map_err(|_| ParseError::InvalidAmount(s.to_owned()))
}

/// Serde adapter encoding a [`U256`] as a base-10 string.
///
/// Use with `#[serde(with = "trestle_primitives::amount::dec_str")]`.
pub mod dec_str {
    use ethnum::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serializes the amount as a base-10 string.
    pub fn serialize<S: Serializer>(amount: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    /// Deserializes the amount from a base-10 string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;

        super::parse_decimal(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[test]
    fn parses_values_beyond_u64() {
        let one_ether = parse_decimal("1000000000000000000").expect("must parse 10^18");
        assert_eq!(one_ether.to_string(), "1000000000000000000");

        let huge = parse_decimal(&U256::MAX.to_string()).expect("must parse U256::MAX");
        assert_eq!(huge, U256::MAX);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_decimal("").is_err());
        assert!(parse_decimal("12abc").is_err());
        assert!(parse_decimal("-5").is_err());
    }

    #[test]
    fn serde_adapter_roundtrips() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            #[serde(with = "super::dec_str")]
            amount: U256,
        }

        let wrapper = Wrapper {
            amount: parse_decimal("340282366920938463463374607431768211456").expect("must parse"),
        };
        let encoded = serde_json::to_string(&wrapper).expect("must serialize");

        assert_eq!(
            encoded, r#"{"amount":"340282366920938463463374607431768211456"}"#,
            "amounts must be encoded as decimal strings"
        );

        let decoded: Wrapper = serde_json::from_str(&encoded).expect("must deserialize");
        assert_eq!(decoded.amount, wrapper.amount);
    }
}
