//! Value Objects for the storefront

mod ids;
mod order_number;

pub use ids::{CartId, OrderId, ProductId, UserId};
pub use order_number::{OrderNumber, OrderNumberError};

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SKU (Stock Keeping Unit) value object, always upper case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkuError {
    #[error("SKU is required")]
    Empty,
    #[error("SKU must be at most 50 characters")]
    TooLong,
}

/// Monetary amount in the store currency.
///
/// Serialised as a plain JSON number. All arithmetic is exact; rounding to
/// cents only happens where a rule asks for it (see [`Money::round_cents`]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub const fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn whole(units: i64) -> Self { Self(Decimal::new(units, 0)) }
    pub fn cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }
    pub const fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }

    pub fn multiply(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }

    /// Multiplies by a fractional rate, e.g. `0.08` for 8% tax.
    pub fn scale(&self, rate: Decimal) -> Money { Money(self.0 * rate) }

    /// Rounds to two decimal places, halves away from zero.
    pub fn round_cents(&self) -> Money {
        Money(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) { self.0 += rhs.0; }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Self)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Self(amount) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sku() { let sku = Sku::new(" prod-001 ").unwrap(); assert_eq!(sku.as_str(), "PROD-001"); }

    #[test]
    fn test_sku_rejects_blank() { assert_eq!(Sku::new("   "), Err(SkuError::Empty)); }

    #[test]
    fn test_money_add() {
        let a = Money::whole(100);
        let b = Money::whole(50);
        assert_eq!((a + b).amount(), Decimal::new(150, 0));
    }

    #[test]
    fn test_money_sum_and_multiply() {
        let total: Money = [Money::cents(1999).multiply(2), Money::whole(5)].into_iter().sum();
        assert_eq!(total, Money::cents(4498));
    }

    #[test]
    fn test_money_parses_query_values() {
        assert_eq!("19.99".parse::<Money>().unwrap(), Money::cents(1999));
        assert!("-1".parse::<Money>().unwrap().is_negative());
        assert!("ten".parse::<Money>().is_err());
    }

    #[test]
    fn test_round_cents_half_away_from_zero() {
        assert_eq!(Money::new(Decimal::new(1005, 3)).round_cents(), Money::cents(101));
        assert_eq!(Money::new(Decimal::new(1004, 3)).round_cents(), Money::cents(100));
    }

    #[test]
    fn test_money_serialises_as_number() {
        let json = serde_json::to_value(Money::cents(960)).unwrap();
        assert!(json.is_number());
        assert!((json.as_f64().unwrap() - 9.6).abs() < 1e-9);
    }
}
