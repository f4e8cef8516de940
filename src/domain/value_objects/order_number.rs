//! Human-facing order number: `LUX` + last six digits of a millisecond
//! timestamp + a zero-padded three digit random suffix.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PREFIX: &str = "LUX";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid order number: {0}")]
pub struct OrderNumberError(String);

impl OrderNumber {
    /// Builds a number from the clock and a random source. Uniqueness is
    /// the store's job; callers regenerate on conflict.
    pub fn generate<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> Self {
        let millis = now.timestamp_millis().rem_euclid(1_000_000);
        let suffix: u16 = rng.gen_range(0..1000);
        Self(format!("{PREFIX}{millis:06}{suffix:03}"))
    }

    pub fn parse(value: &str) -> Result<Self, OrderNumberError> {
        let digits = value
            .strip_prefix(PREFIX)
            .ok_or_else(|| OrderNumberError(value.to_string()))?;
        if digits.len() != 9 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OrderNumberError(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for OrderNumber {
    type Error = OrderNumberError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self { number.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_numbers_match_format() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc.timestamp_millis_opt(1_700_000_123_456).unwrap();
        let number = OrderNumber::generate(now, &mut rng);
        assert!(number.as_str().starts_with("LUX123456"));
        assert_eq!(number.as_str().len(), 12);
        assert!(OrderNumber::parse(number.as_str()).is_ok());
    }

    #[test]
    fn keeps_leading_zeros_of_timestamp_tail() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc.timestamp_millis_opt(1_700_000_000_042).unwrap();
        assert!(OrderNumber::generate(now, &mut rng).as_str().starts_with("LUX000042"));
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert!(OrderNumber::parse("LUX12345678").is_err());
        assert!(OrderNumber::parse("ORD123456789").is_err());
        assert!(OrderNumber::parse("LUX12345678a").is_err());
    }
}
