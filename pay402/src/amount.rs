//! Atomic-unit token amounts.
//!
//! All protocol amounts are integers in the token's smallest denomination
//! (e.g. 1 USDC = 1,000,000 atomic units at 6 decimals). Floating point
//! never appears on the wire or in comparisons.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A token amount in atomic units.
///
/// Serialized as a decimal string (e.g. `"1000000"`) so that large values
/// survive JSON parsers that cannot represent 256-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    /// Returns the inner 256-bit value.
    #[must_use]
    pub const fn inner(&self) -> U256 {
        self.0
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl FromStr for TokenAmount {
    type Err = alloy_primitives::ruint::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str(s).map(Self)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<Self>()
            .map_err(|_| serde::de::Error::custom("amount must be a non-negative integer string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_decimal_string() {
        let amount = TokenAmount::from(1_000_000u64);
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"1000000\"");
    }

    #[test]
    fn parses_decimal_string() {
        let amount: TokenAmount = serde_json::from_str("\"250000\"").unwrap();
        assert_eq!(amount, TokenAmount::from(250_000u64));
    }

    #[test]
    fn rejects_negative_and_fractional() {
        assert!(serde_json::from_str::<TokenAmount>("\"-5\"").is_err());
        assert!(serde_json::from_str::<TokenAmount>("\"1.5\"").is_err());
    }

    #[test]
    fn orders_numerically() {
        let small = TokenAmount::from(10u64);
        let large = TokenAmount::from(1_000u64);
        assert!(small < large);
    }
}
