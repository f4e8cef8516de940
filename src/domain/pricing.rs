//! Checkout pricing: shipping, tax and totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Money;

/// Store-wide pricing knobs, loaded from configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Shipping is free when the items price is strictly above this.
    pub free_shipping_threshold: Money,
    pub flat_shipping_fee: Money,
    /// Fraction of the items price, e.g. `0.08`.
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Money::whole(100),
            flat_shipping_fee: Money::whole(10),
            tax_rate: Decimal::new(8, 2),
        }
    }
}

/// Price breakdown stored on every order.
///
/// `total_price == items_price + shipping_price + tax_price` holds for every
/// value built through [`Pricing::compute`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub items_price: Money,
    pub shipping_price: Money,
    pub tax_price: Money,
    pub total_price: Money,
}

impl Pricing {
    pub fn compute(items_price: Money, policy: &PricingPolicy) -> Self {
        let shipping_price = if items_price > policy.free_shipping_threshold {
            Money::ZERO
        } else {
            policy.flat_shipping_fee
        };
        let tax_price = items_price.scale(policy.tax_rate).round_cents();
        Self {
            items_price,
            shipping_price,
            tax_price,
            total_price: items_price + shipping_price + tax_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_shipping_above_threshold() {
        let pricing = Pricing::compute(Money::whole(120), &PricingPolicy::default());
        assert_eq!(pricing.shipping_price, Money::ZERO);
        assert_eq!(pricing.tax_price, Money::cents(960));
        assert_eq!(pricing.total_price, Money::cents(12960));
    }

    #[test]
    fn flat_fee_at_or_below_threshold() {
        let pricing = Pricing::compute(Money::whole(20), &PricingPolicy::default());
        assert_eq!(pricing.shipping_price, Money::whole(10));
        assert_eq!(pricing.tax_price, Money::cents(160));
        assert_eq!(pricing.total_price, Money::cents(3160));

        let boundary = Pricing::compute(Money::whole(100), &PricingPolicy::default());
        assert_eq!(boundary.shipping_price, Money::whole(10));
    }

    #[test]
    fn tax_rounds_to_cents() {
        // 19.99 * 0.08 = 1.5992
        let pricing = Pricing::compute(Money::cents(1999), &PricingPolicy::default());
        assert_eq!(pricing.tax_price, Money::cents(160));
        assert_eq!(
            pricing.total_price,
            pricing.items_price + pricing.shipping_price + pricing.tax_price
        );
    }

    #[test]
    fn custom_policy() {
        let policy = PricingPolicy {
            free_shipping_threshold: Money::whole(50),
            flat_shipping_fee: Money::cents(499),
            tax_rate: Decimal::new(5, 2),
        };
        let pricing = Pricing::compute(Money::whole(40), &policy);
        assert_eq!(pricing.shipping_price, Money::cents(499));
        assert_eq!(pricing.tax_price, Money::whole(2));
    }
}
