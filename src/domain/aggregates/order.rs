//! Order Aggregate

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::pricing::Pricing;
use crate::domain::value_objects::{Money, OrderId, OrderNumber, ProductId, UserId};

/// A placed order. Items, address and pricing are snapshots taken at
/// placement and never change afterwards; only the status fields move.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user: UserId,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_info: PaymentInfo,
    #[serde(flatten)]
    pub pricing: Pricing,
    pub status: OrderStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product: ProductId,
    pub name: String,
    pub image: String,
    pub price: Money,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> Money { self.price.multiply(self.quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentInfo {
    /// Payment record for a fresh order: cash on delivery stays pending,
    /// every other method counts as paid at `now`.
    pub fn at_checkout(method: PaymentMethod, transaction_id: Option<String>, now: DateTime<Utc>) -> Self {
        let transaction_id = transaction_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("TXN{}", now.timestamp_millis()));
        let (status, paid_at) = match method {
            PaymentMethod::Cod => (PaymentStatus::Pending, None),
            _ => (PaymentStatus::Completed, Some(now)),
        };
        Self { method, status, transaction_id: Some(transaction_id), paid_at }
    }
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name { $($variant),+ }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn as_str(&self) -> &'static str {
                match self { $($name::$variant => $text),+ }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown value: {0}")]
pub struct UnknownVariant(pub String);

string_enum!(PaymentMethod {
    CreditCard => "credit_card",
    DebitCard => "debit_card",
    Paypal => "paypal",
    Cod => "cod",
});

string_enum!(PaymentStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
});

string_enum!(
    /// Lifecycle of an order. `Delivered` and `Cancelled` are terminal.
    OrderStatus {
        Pending => "pending",
        Processing => "processing",
        Shipped => "shipped",
        Delivered => "delivered",
        Cancelled => "cancelled",
    }
);

impl Default for OrderStatus {
    fn default() -> Self { OrderStatus::Pending }
}

impl OrderStatus {
    pub const fn is_terminal(&self) -> bool { matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled) }

    const fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Shipped => 2,
            OrderStatus::Delivered => 3,
            OrderStatus::Cancelled => 4,
        }
    }
}

/// Which status replacements an admin may perform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    /// Any status may replace any other.
    #[default]
    Unrestricted,
    /// pending -> processing -> shipped -> delivered, cancel from any
    /// non-terminal status, terminal statuses are final. Re-applying the
    /// current status is allowed so tracking details can be amended.
    ForwardOnly,
}

impl StatusPolicy {
    pub fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        match self {
            StatusPolicy::Unrestricted => true,
            StatusPolicy::ForwardOnly => {
                if from == to { return true; }
                if from.is_terminal() { return false; }
                to == OrderStatus::Cancelled || to.rank() > from.rank()
            }
        }
    }
}

impl FromStr for StatusPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "unrestricted" => Ok(StatusPolicy::Unrestricted),
            "forward" | "forward_only" => Ok(StatusPolicy::ForwardOnly),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_number: OrderNumber,
    pub total_items: u32,
    pub total_price: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Assembles a pending order. `pricing` is recomputed from `items` by the
    /// caller; this constructor only stamps identity and timestamps.
    pub fn place(
        order_number: OrderNumber,
        user: UserId,
        items: Vec<OrderItem>,
        shipping_address: ShippingAddress,
        payment_info: PaymentInfo,
        pricing: Pricing,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::generate(), order_number, user, items, shipping_address, payment_info, pricing,
            status: OrderStatus::Pending, delivered_at: None, notes, tracking_number: None,
            estimated_delivery: None, created_at: now, updated_at: now,
        }
    }

    pub fn items_total(&self) -> Money { self.items.iter().map(OrderItem::line_total).sum() }

    pub fn total_items(&self) -> u32 { self.items.iter().fold(0, |acc, i| acc.saturating_add(i.quantity)) }

    pub fn can_cancel(&self) -> bool { !self.status.is_terminal() }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.can_cancel() { return Err(OrderError::CannotCancel(self.status)); }
        self.status = OrderStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Admin status change. A supplied tracking number is stored; moving to
    /// delivered stamps `delivered_at`.
    pub fn update_status(
        &mut self,
        status: OrderStatus,
        tracking_number: Option<String>,
        policy: StatusPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !policy.allows(self.status, status) {
            return Err(OrderError::TransitionNotAllowed { from: self.status, to: status });
        }
        self.status = status;
        if let Some(tracking) = tracking_number.filter(|t| !t.is_empty()) {
            self.tracking_number = Some(tracking);
        }
        if status == OrderStatus::Delivered {
            self.delivered_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            order_number: self.order_number.clone(),
            total_items: self.total_items(),
            total_price: self.pricing.total_price,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Order cannot be cancelled (status: {0})")]
    CannotCancel(OrderStatus),
    #[error("Cannot change order status from {from} to {to}")]
    TransitionNotAllowed { from: OrderStatus, to: OrderStatus },
}
