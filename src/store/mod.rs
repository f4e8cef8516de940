//! Persistence for products, carts, orders and users.
//!
//! The rest of the crate talks to a [`SharedStore`] handle created once at
//! startup by [`open`] and closed on shutdown. Two backends exist:
//!
//! - [`PgStore`]: PostgreSQL through `sqlx`. Nested sub-documents (images,
//!   reviews, cart lines, order lines, addresses) live in JSONB columns.
//! - [`MemoryStore`]: everything behind one lock, for development and tests.
//!
//! Multi-entity writes (`place_order`, `cancel_order`) are all-or-nothing in
//! both backends, and stock never goes below zero.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::Config;
use crate::domain::{Cart, Money, Order, OrderId, OrderStatus, Product, ProductId, Role, Sku, User, UserId};
use crate::pagination::PageRequest;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    #[error("not found")]
    NotFound,

    /// Unique constraint violation (SKU, order number, email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A conditional stock decrement was refused.
    #[error("insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },

    /// A conditional state change was refused.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Filtered, sorted page of products plus the total number of matches.
    async fn list_products(&self, query: &ProductQuery) -> StoreResult<(Vec<Product>, u64)>;
    async fn find_product(&self, id: ProductId) -> StoreResult<Option<Product>>;
    async fn find_products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>>;
    async fn find_product_by_sku(&self, sku: &Sku) -> StoreResult<Option<Product>>;
    /// Fails with `Conflict` when the SKU is taken.
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    /// Persists every field except `stock`.
    async fn update_product(&self, product: &Product) -> StoreResult<()>;
    async fn set_stock(&self, id: ProductId, stock: u32) -> StoreResult<()>;
    /// Adds a signed amount to stock and returns the new level. Refuses with
    /// `InsufficientStock` instead of going below zero.
    async fn adjust_stock(&self, id: ProductId, delta: i64) -> StoreResult<u32>;
    /// Distinct categories of active products, sorted.
    async fn categories(&self) -> StoreResult<Vec<String>>;
    async fn count_active_products(&self) -> StoreResult<u64>;
    /// Active products at or below their low-stock threshold.
    async fn low_stock_products(&self, limit: u32) -> StoreResult<Vec<Product>>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn find_cart(&self, user: UserId) -> StoreResult<Option<Cart>>;
    /// Upsert keyed by the owning user.
    async fn save_cart(&self, cart: &Cart) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts `order`, decrements stock for each line and empties the
    /// owner's cart as one unit. `Conflict` on a duplicate order number,
    /// `InsufficientStock` if any decrement would go below zero; in both
    /// cases nothing is written.
    async fn place_order(&self, order: &Order) -> StoreResult<()>;
    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>>;
    /// Newest first.
    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> StoreResult<(Vec<Order>, u64)>;
    /// Moves a non-terminal order to cancelled and restocks every line as
    /// one unit. `InvalidState` if the order is already terminal.
    async fn cancel_order(&self, id: OrderId, at: DateTime<Utc>) -> StoreResult<Order>;
    /// Persists status, tracking number, delivery stamp and `updated_at`,
    /// provided the stored status is still `expected`. `InvalidState` if
    /// another writer moved the order first.
    async fn update_order_status(&self, order: &Order, expected: OrderStatus) -> StoreResult<()>;
    async fn count_orders(&self) -> StoreResult<u64>;
    /// Sum of `totalPrice` over orders whose payment completed.
    async fn completed_revenue(&self) -> StoreResult<Money>;
    /// Orders created at or after `since`, oldest first.
    async fn orders_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Order>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;
    /// Resolves a bearer token issued by the identity collaborator.
    async fn find_user_by_token(&self, token: &str) -> StoreResult<Option<User>>;
    async fn issue_token(&self, user: UserId, token: &str) -> StoreResult<()>;
    /// Newest first.
    async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> StoreResult<(Vec<User>, u64)>;
    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<()>;
    async fn count_users(&self, role: Role) -> StoreResult<u64>;
}

#[async_trait]
pub trait Store: CatalogStore + CartStore + OrderStore + UserStore {
    fn backend(&self) -> &'static str;
    async fn ping(&self) -> StoreResult<()>;
    async fn close(&self);
}

pub type SharedStore = Arc<dyn Store>;

/// Opens the configured backend: PostgreSQL (with migrations applied) when a
/// database URL is set, the in-memory store otherwise.
pub async fn open(config: &Config) -> StoreResult<SharedStore> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            tracing::info!(backend = store.backend(), "store opened");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on shutdown");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

// =============================================================================
// Query types
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProductSort {
    PriceAsc,
    PriceDesc,
    Rating,
    #[default]
    Newest,
}

impl ProductSort {
    /// Unknown values fall back to newest first.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("price_asc") => ProductSort::PriceAsc,
            Some("price_desc") => ProductSort::PriceDesc,
            Some("rating") => ProductSort::Rating,
            _ => ProductSort::Newest,
        }
    }

    /// In-process ordering matching the SQL `ORDER BY` of each variant, with
    /// newest-then-id as tiebreak.
    pub fn compare(&self, a: &Product, b: &Product) -> Ordering {
        let primary = match self {
            ProductSort::PriceAsc => a.price.cmp(&b.price),
            ProductSort::PriceDesc => b.price.cmp(&a.price),
            ProductSort::Rating => b.average_rating.total_cmp(&a.average_rating),
            ProductSort::Newest => Ordering::Equal,
        };
        primary
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub min_rating: Option<f64>,
    /// Case-insensitive substring of the brand.
    pub brand: Option<String>,
    pub featured_only: bool,
    pub search: Option<String>,
    pub sort: ProductSort,
    pub include_inactive: bool,
    pub page: PageRequest,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            category: None, min_price: None, max_price: None, min_rating: None, brand: None,
            featured_only: false, search: None, sort: ProductSort::default(), include_inactive: false,
            page: PageRequest::new(1, 12),
        }
    }
}

impl ProductQuery {
    /// Lower-cased search terms; empty when no search was requested.
    pub fn search_terms(&self) -> Vec<String> {
        self.search
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_lowercase).collect())
            .unwrap_or_default()
    }

    /// Every filter except the text search.
    pub fn matches(&self, product: &Product) -> bool {
        if !self.include_inactive && !product.is_active { return false; }
        if self.category.as_ref().is_some_and(|c| &product.category != c) { return false; }
        if self.min_price.is_some_and(|min| product.price < min) { return false; }
        if self.max_price.is_some_and(|max| product.price > max) { return false; }
        if self.min_rating.is_some_and(|r| product.average_rating < r) { return false; }
        if self.featured_only && !product.is_featured { return false; }
        if let Some(brand) = &self.brand {
            let needle = brand.to_lowercase();
            if !product.brand.as_deref().is_some_and(|b| b.to_lowercase().contains(&needle)) { return false; }
        }
        true
    }
}

/// Text relevance of a product for the given terms: name hits weigh 3,
/// brand/category hits 2, description hits 1. Zero means no match.
pub fn relevance(product: &Product, terms: &[String]) -> u32 {
    let name = product.name.to_lowercase();
    let secondary = format!("{} {}", product.brand.as_deref().unwrap_or(""), product.category).to_lowercase();
    let description = product.description.to_lowercase();
    terms
        .iter()
        .map(|term| {
            let mut score = 0;
            if name.contains(term.as_str()) { score += 3; }
            if secondary.contains(term.as_str()) { score += 2; }
            if description.contains(term.as_str()) { score += 1; }
            score
        })
        .sum()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub user: Option<UserId>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.user.map_or(true, |u| order.user == u) && self.status.map_or(true, |s| order.status == s)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        self.role.map_or(true, |r| user.role == r) && self.is_active.map_or(true, |a| user.is_active == a)
    }
}
