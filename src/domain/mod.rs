//! Domain model: aggregates, value objects and the pricing rules that tie
//! them together.

pub mod aggregates;
pub mod pricing;
pub mod value_objects;

pub use aggregates::{
    Cart, CartError, CartItem, CartSummary, Order, OrderError, OrderItem, OrderStatus, OrderSummary,
    PaymentInfo, PaymentMethod, PaymentStatus, Product, ProductError, ProductImage, Review, Role,
    ShippingAddress, Specification, StatusPolicy, User, DEFAULT_LOW_STOCK_THRESHOLD,
};
pub use pricing::{Pricing, PricingPolicy};
pub use value_objects::{CartId, Money, OrderId, OrderNumber, ProductId, Sku, SkuError, UserId};
