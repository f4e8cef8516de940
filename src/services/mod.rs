//! Application services. Each one owns a [`SharedStore`](crate::store::SharedStore)
//! handle and turns validated requests into store calls.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod payments;
pub mod reporting;

pub use cart::{CartService, DetailedCart};
pub use catalog::{CatalogService, NewProduct, NewReview, ProductChanges, ReviewOutcome};
pub use checkout::{AddressInput, CheckoutService, PaymentInput, PlaceOrder};
pub use payments::{PaymentReceipt, PaymentRequest, PaymentSimulator};
pub use reporting::{Dashboard, Period, ReportingService, SalesAnalytics};
