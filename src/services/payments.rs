//! Simulated card/wallet payment processing. Never touches real funds.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::domain::{Money, PaymentMethod, PaymentStatus};
use crate::error::{EcommerceError, Result};

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentRequest {
    #[validate(custom = "positive_amount")]
    pub amount: Option<Money>,
    #[validate(custom = "payable_method")]
    pub method: String,
    #[validate(custom = "valid_card_number")]
    pub card_number: Option<String>,
    #[validate(custom = "valid_expiry_date")]
    pub expiry_date: Option<String>,
    #[validate(custom = "valid_cvv")]
    pub cvv: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub processed_at: DateTime<Utc>,
}

fn rejected(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

fn positive_amount(value: &Money) -> std::result::Result<(), ValidationError> {
    if value.is_negative() { Err(rejected("range", "Amount must be positive")) } else { Ok(()) }
}

fn payable_method(value: &str) -> std::result::Result<(), ValidationError> {
    match value.parse::<PaymentMethod>() {
        Ok(PaymentMethod::Cod) | Err(_) => Err(rejected("method", "Invalid payment method")),
        Ok(_) => Ok(()),
    }
}

fn all_digits(value: &str, lengths: std::ops::RangeInclusive<usize>) -> bool {
    lengths.contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}

fn valid_card_number(value: &str) -> std::result::Result<(), ValidationError> {
    if all_digits(value, 16..=16) { Ok(()) } else { Err(rejected("length", "Card number must be 16 digits")) }
}

/// `MM/YY` with a month between 01 and 12.
fn valid_expiry_date(value: &str) -> std::result::Result<(), ValidationError> {
    let invalid = || rejected("format", "Invalid expiry date format (MM/YY)");
    let (month, year) = value.split_once('/').ok_or_else(invalid)?;
    if !all_digits(month, 2..=2) || !all_digits(year, 2..=2) {
        return Err(invalid());
    }
    match month.parse::<u8>() {
        Ok(1..=12) => Ok(()),
        _ => Err(invalid()),
    }
}

fn valid_cvv(value: &str) -> std::result::Result<(), ValidationError> {
    if all_digits(value, 3..=4) { Ok(()) } else { Err(rejected("length", "CVV must be 3-4 digits")) }
}

/// Approves a configurable share of payments.
pub struct PaymentSimulator {
    success_rate: f64,
}

impl PaymentSimulator {
    pub fn new(success_rate: f64) -> Self {
        Self { success_rate: success_rate.clamp(0.0, 1.0) }
    }

    pub fn process(&self, request: PaymentRequest) -> Result<PaymentReceipt> {
        self.process_with(request, Utc::now(), &mut rand::thread_rng())
    }

    pub fn process_with<R: Rng + ?Sized>(
        &self,
        request: PaymentRequest,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<PaymentReceipt> {
        request.validate()?;
        let amount = request.amount.ok_or_else(|| EcommerceError::validation("amount", "Amount must be positive"))?;
        let method = request
            .method
            .parse::<PaymentMethod>()
            .map_err(|_| EcommerceError::validation("method", "Invalid payment method"))?;

        if !rng.gen_bool(self.success_rate) {
            tracing::warn!(%method, %amount, "simulated payment declined");
            return Err(EcommerceError::PaymentDeclined);
        }

        let suffix: u16 = rng.gen_range(0..1000);
        Ok(PaymentReceipt {
            transaction_id: format!("TXN{}{suffix}", now.timestamp_millis()),
            amount,
            method,
            status: PaymentStatus::Completed,
            processed_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn card_payment() -> PaymentRequest {
        PaymentRequest {
            amount: Some(Money::cents(12960)),
            method: "credit_card".into(),
            card_number: Some("4242424242424242".into()),
            expiry_date: Some("09/28".into()),
            cvv: Some("123".into()),
        }
    }

    #[test]
    fn always_succeeds_at_full_rate() {
        let now = Utc::now();
        let receipt = PaymentSimulator::new(1.0)
            .process_with(card_payment(), now, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(receipt.status, PaymentStatus::Completed);
        assert_eq!(receipt.amount, Money::cents(12960));
        assert!(receipt.transaction_id.starts_with(&format!("TXN{}", now.timestamp_millis())));
    }

    #[test]
    fn declines_at_zero_rate() {
        let result = PaymentSimulator::new(0.0).process_with(card_payment(), Utc::now(), &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(EcommerceError::PaymentDeclined)));
    }

    #[test]
    fn rejects_cash_on_delivery_and_bad_card_fields() {
        let simulator = PaymentSimulator::new(1.0);
        let mut rng = StdRng::seed_from_u64(2);

        let cod = PaymentRequest { method: "cod".into(), ..card_payment() };
        assert!(matches!(simulator.process_with(cod, Utc::now(), &mut rng), Err(EcommerceError::Validation(_))));

        let bad = PaymentRequest {
            card_number: Some("4242".into()),
            expiry_date: Some("13/28".into()),
            cvv: Some("12a".into()),
            ..card_payment()
        };
        let Err(EcommerceError::Validation(fields)) = simulator.process_with(bad, Utc::now(), &mut rng) else {
            panic!("expected validation error");
        };
        let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(names, vec!["cardNumber", "cvv", "expiryDate"]);
    }

    #[test]
    fn card_fields_are_optional() {
        let paypal = PaymentRequest { amount: Some(Money::ZERO), method: "paypal".into(), ..PaymentRequest::default() };
        assert!(PaymentSimulator::new(1.0).process_with(paypal, Utc::now(), &mut StdRng::seed_from_u64(3)).is_ok());
    }
}
