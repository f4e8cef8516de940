//! LuxStore storefront backend
//!
//! Catalog, cart, checkout and admin reporting behind a JSON REST API.
//!
//! ## Features
//! - Product catalog with filtering, text search, reviews and soft delete
//! - Per-user shopping carts validated against live stock
//! - Order placement that commits order, stock and cart together
//! - Simulated payment processing
//! - Admin dashboard, sales analytics and account control
//!
//! Storage is PostgreSQL when `DATABASE_URL` is set and an in-memory store
//! otherwise; see [`store::open`].

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod pagination;
pub mod services;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{router, AppState};
pub use config::{Config, ConfigError};
pub use error::{EcommerceError, FieldError, Result};
pub use store::{SharedStore, Store, StoreError};
