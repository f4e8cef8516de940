//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod user;

pub use product::{Product, ProductError, ProductImage, Review, Specification, DEFAULT_LOW_STOCK_THRESHOLD};
pub use order::{
    Order, OrderError, OrderItem, OrderStatus, OrderSummary, PaymentInfo, PaymentMethod, PaymentStatus,
    ShippingAddress, StatusPolicy, UnknownVariant,
};
pub use cart::{Cart, CartError, CartItem, CartSummary};
pub use user::{Role, User};
