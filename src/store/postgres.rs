//! PostgreSQL store.
//!
//! Queries are built at runtime (`query_as::<_, Row>`) and decoded into
//! private row structs, then converted into domain types. Anything in a row
//! that fails to convert is reported as `DataCorruption`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    CartStore, CatalogStore, OrderFilter, OrderStore, ProductQuery, ProductSort, Store, StoreError, StoreResult,
    UserFilter, UserStore,
};
use crate::domain::{
    Cart, CartId, CartItem, Money, Order, OrderId, OrderItem, OrderNumber, OrderStatus, PaymentInfo, PaymentMethod,
    PaymentStatus, Pricing, Product, ProductId, ProductImage, Review, Role, ShippingAddress, Sku, Specification,
    User, UserId,
};
use crate::pagination::PageRequest;

const PRODUCT_COLUMNS: &str = "id, name, description, price, original_price, category, subcategory, brand, sku, \
     images, stock, low_stock_threshold, is_active, is_featured, tags, features, specifications, reviews, \
     average_rating, total_reviews, created_by, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, order_number, user_id, items, shipping_address, payment_method, payment_status, \
     transaction_id, paid_at, items_price, shipping_price, tax_price, total_price, status, delivered_at, notes, \
     tracking_number, estimated_delivery, created_at, updated_at";

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, role, is_active, created_at, updated_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: String,
    price: Decimal,
    original_price: Option<Decimal>,
    category: String,
    subcategory: Option<String>,
    brand: Option<String>,
    sku: String,
    images: Json<Vec<ProductImage>>,
    stock: i32,
    low_stock_threshold: i32,
    is_active: bool,
    is_featured: bool,
    tags: Vec<String>,
    features: Vec<String>,
    specifications: Json<Vec<Specification>>,
    reviews: Json<Vec<Review>>,
    average_rating: f64,
    total_reviews: i32,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let sku = Sku::new(row.sku).map_err(|e| StoreError::DataCorruption(format!("invalid sku in database: {e}")))?;
        Ok(Product {
            id: ProductId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            price: Money::new(row.price),
            original_price: row.original_price.map(Money::new),
            category: row.category,
            subcategory: row.subcategory,
            brand: row.brand,
            sku,
            images: row.images.0,
            stock: from_db_int(row.stock, "stock")?,
            low_stock_threshold: from_db_int(row.low_stock_threshold, "low_stock_threshold")?,
            is_active: row.is_active,
            is_featured: row.is_featured,
            tags: row.tags,
            features: row.features,
            specifications: row.specifications.0,
            reviews: row.reviews.0,
            average_rating: row.average_rating,
            total_reviews: from_db_int(row.total_reviews, "total_reviews")?,
            created_by: row.created_by.map(UserId::from_uuid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Uuid,
    items: Json<Vec<CartItem>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Cart::restore(CartId::from_uuid(row.id), UserId::from_uuid(row.user_id), row.items.0, row.created_at, row.updated_at)
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    items: Json<Vec<OrderItem>>,
    shipping_address: Json<ShippingAddress>,
    payment_method: String,
    payment_status: String,
    transaction_id: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    items_price: Decimal,
    shipping_price: Decimal,
    tax_price: Decimal,
    total_price: Decimal,
    status: String,
    delivered_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    tracking_number: Option<String>,
    estimated_delivery: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |e: String| StoreError::DataCorruption(format!("invalid order {}: {e}", row.id));
        let order_number = OrderNumber::parse(&row.order_number).map_err(|e| corrupt(e.to_string()))?;
        let method = row.payment_method.parse::<PaymentMethod>().map_err(|e| corrupt(e.to_string()))?;
        let payment_status = row.payment_status.parse::<PaymentStatus>().map_err(|e| corrupt(e.to_string()))?;
        let status = row.status.parse::<OrderStatus>().map_err(|e| corrupt(e.to_string()))?;
        Ok(Order {
            id: OrderId::from_uuid(row.id),
            order_number,
            user: UserId::from_uuid(row.user_id),
            items: row.items.0,
            shipping_address: row.shipping_address.0,
            payment_info: PaymentInfo {
                method,
                status: payment_status,
                transaction_id: row.transaction_id,
                paid_at: row.paid_at,
            },
            pricing: Pricing {
                items_price: Money::new(row.items_price),
                shipping_price: Money::new(row.shipping_price),
                tax_price: Money::new(row.tax_price),
                total_price: Money::new(row.total_price),
            },
            status,
            delivered_at: row.delivered_at,
            notes: row.notes,
            tracking_number: row.tracking_number,
            estimated_delivery: row.estimated_delivery,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::DataCorruption(format!("invalid role in database: {e}")))?;
        Ok(User {
            id: UserId::from_uuid(row.id),
            username: row.username,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            role,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn from_db_int(value: i32, field: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::DataCorruption(format!("negative {field} in database: {value}")))
}

fn to_db_int(value: u32, field: &str) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::InvalidState(format!("{field} out of range: {value}")))
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Maps unique violations to `Conflict`, everything else to `Database`.
fn conflict_or_database(err: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(what());
        }
    }
    StoreError::Database(err)
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Conditional stock change on an open connection or transaction.
async fn apply_stock_delta(conn: &mut PgConnection, id: ProductId, delta: i64) -> StoreResult<u32> {
    let updated: Option<i32> = sqlx::query_scalar(
        "UPDATE products SET stock = stock + $2::BIGINT, updated_at = NOW() \
         WHERE id = $1 AND stock + $2::BIGINT >= 0 RETURNING stock",
    )
    .bind(id.as_uuid())
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some(stock) => from_db_int(stock, "stock"),
        None => {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&mut *conn)
                .await?;
            if exists {
                Err(StoreError::InsufficientStock { product_id: id })
            } else {
                Err(StoreError::NotFound)
            }
        }
    }
}

/// Weighted substring score matching [`super::relevance`].
fn push_relevance(qb: &mut QueryBuilder<'_, Postgres>, terms: &[String]) {
    qb.push("(0");
    for term in terms {
        qb.push(" + CASE WHEN strpos(lower(name), ").push_bind(term.clone()).push(") > 0 THEN 3 ELSE 0 END");
        qb.push(" + CASE WHEN strpos(lower(coalesce(brand, '') || ' ' || category), ")
            .push_bind(term.clone())
            .push(") > 0 THEN 2 ELSE 0 END");
        qb.push(" + CASE WHEN strpos(lower(description), ").push_bind(term.clone()).push(") > 0 THEN 1 ELSE 0 END");
    }
    qb.push(")");
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery, terms: &[String]) {
    qb.push(" WHERE TRUE");
    if !query.include_inactive {
        qb.push(" AND is_active");
    }
    if let Some(category) = &query.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(min) = query.min_price {
        qb.push(" AND price >= ").push_bind(min.amount());
    }
    if let Some(max) = query.max_price {
        qb.push(" AND price <= ").push_bind(max.amount());
    }
    if let Some(rating) = query.min_rating {
        qb.push(" AND average_rating >= ").push_bind(rating);
    }
    if query.featured_only {
        qb.push(" AND is_featured");
    }
    if let Some(brand) = &query.brand {
        qb.push(" AND strpos(lower(coalesce(brand, '')), ").push_bind(brand.to_lowercase()).push(") > 0");
    }
    if !terms.is_empty() {
        qb.push(" AND ");
        push_relevance(qb, terms);
        qb.push(" > 0");
    }
}

fn sort_clause(sort: ProductSort) -> &'static str {
    match sort {
        ProductSort::PriceAsc => "price ASC, ",
        ProductSort::PriceDesc => "price DESC, ",
        ProductSort::Rating => "average_rating DESC, ",
        ProductSort::Newest => "",
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_products(&self, query: &ProductQuery) -> StoreResult<(Vec<Product>, u64)> {
        let terms = query.search_terms();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_product_filters(&mut count, query, &terms);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_product_filters(&mut select, query, &terms);
        select.push(" ORDER BY ");
        if !terms.is_empty() {
            push_relevance(&mut select, &terms);
            select.push(" DESC, ");
        }
        select.push(sort_clause(query.sort)).push("created_at DESC, id ASC");
        select.push(" LIMIT ").push_bind(i64::from(query.page.limit));
        select.push(" OFFSET ").push_bind(i64::try_from(query.page.offset()).unwrap_or(i64::MAX));

        let rows: Vec<ProductRow> = select.build_query_as().fetch_all(&self.pool).await?;
        Ok((collect(rows)?, to_count(total)))
    }

    async fn find_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn find_products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"))
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn find_product_by_sku(&self, sku: &Sku) -> StoreResult<Option<Product>> {
        sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = $1"))
            .bind(sku.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)"
        ))
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(product.original_price.map(|p| p.amount()))
        .bind(&product.category)
        .bind(&product.subcategory)
        .bind(&product.brand)
        .bind(product.sku.as_str())
        .bind(Json(&product.images))
        .bind(to_db_int(product.stock, "stock")?)
        .bind(to_db_int(product.low_stock_threshold, "low_stock_threshold")?)
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(&product.tags)
        .bind(&product.features)
        .bind(Json(&product.specifications))
        .bind(Json(&product.reviews))
        .bind(product.average_rating)
        .bind(to_db_int(product.total_reviews, "total_reviews")?)
        .bind(product.created_by.map(|u| u.as_uuid()))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_database(e, || format!("sku {} already exists", product.sku)))?;
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE products SET name = $2, description = $3, price = $4, original_price = $5, category = $6, \
             subcategory = $7, brand = $8, sku = $9, images = $10, low_stock_threshold = $11, is_active = $12, \
             is_featured = $13, tags = $14, features = $15, specifications = $16, reviews = $17, \
             average_rating = $18, total_reviews = $19, updated_at = $20 \
             WHERE id = $1",
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(product.original_price.map(|p| p.amount()))
        .bind(&product.category)
        .bind(&product.subcategory)
        .bind(&product.brand)
        .bind(product.sku.as_str())
        .bind(Json(&product.images))
        .bind(to_db_int(product.low_stock_threshold, "low_stock_threshold")?)
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(&product.tags)
        .bind(&product.features)
        .bind(Json(&product.specifications))
        .bind(Json(&product.reviews))
        .bind(product.average_rating)
        .bind(to_db_int(product.total_reviews, "total_reviews")?)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_database(e, || format!("sku {} already exists", product.sku)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_stock(&self, id: ProductId, stock: u32) -> StoreResult<()> {
        let result = sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(to_db_int(stock, "stock")?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> StoreResult<u32> {
        let mut conn = self.pool.acquire().await?;
        apply_stock_delta(&mut conn, id, delta).await
    }

    async fn categories(&self) -> StoreResult<Vec<String>> {
        let categories: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT category FROM products WHERE is_active ORDER BY category")
                .fetch_all(&self.pool)
                .await?;
        Ok(categories)
    }

    async fn count_active_products(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active")
            .fetch_one(&self.pool)
            .await?;
        Ok(to_count(count))
    }

    async fn low_stock_products(&self, limit: u32) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active AND stock <= low_stock_threshold \
             ORDER BY stock ASC, name ASC LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }
}

// =============================================================================
// Carts
// =============================================================================

#[async_trait]
impl CartStore for PgStore {
    async fn find_cart(&self, user: UserId) -> StoreResult<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(
            "SELECT id, user_id, items, created_at, updated_at FROM carts WHERE user_id = $1",
        )
        .bind(user.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Cart::from))
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO carts (id, user_id, items, created_at, updated_at) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id) DO UPDATE SET items = EXCLUDED.items, updated_at = EXCLUDED.updated_at",
        )
        .bind(cart.id().as_uuid())
        .bind(cart.user_id().as_uuid())
        .bind(Json(cart.items()))
        .bind(cart.created_at())
        .bind(cart.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Orders
// =============================================================================

fn push_order_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    qb.push(" WHERE TRUE");
    if let Some(user) = filter.user {
        qb.push(" AND user_id = ").push_bind(user.as_uuid());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn place_order(&self, order: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.user.as_uuid())
        .bind(Json(&order.items))
        .bind(Json(&order.shipping_address))
        .bind(order.payment_info.method.as_str())
        .bind(order.payment_info.status.as_str())
        .bind(&order.payment_info.transaction_id)
        .bind(order.payment_info.paid_at)
        .bind(order.pricing.items_price.amount())
        .bind(order.pricing.shipping_price.amount())
        .bind(order.pricing.tax_price.amount())
        .bind(order.pricing.total_price.amount())
        .bind(order.status.as_str())
        .bind(order.delivered_at)
        .bind(&order.notes)
        .bind(&order.tracking_number)
        .bind(order.estimated_delivery)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_database(e, || format!("order number {} already exists", order.order_number)))?;

        // Sorted so concurrent placements lock product rows in the same order.
        let mut requested: BTreeMap<ProductId, i64> = BTreeMap::new();
        for item in &order.items {
            *requested.entry(item.product).or_default() += i64::from(item.quantity);
        }
        for (product_id, quantity) in requested {
            apply_stock_delta(&mut tx, product_id, -quantity).await?;
        }

        sqlx::query("UPDATE carts SET items = '[]', updated_at = NOW() WHERE user_id = $1")
            .bind(order.user.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> StoreResult<(Vec<Order>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_order_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        push_order_filters(&mut select, filter);
        select.push(" ORDER BY created_at DESC, id ASC LIMIT ").push_bind(i64::from(page.limit));
        select.push(" OFFSET ").push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows: Vec<OrderRow> = select.build_query_as().fetch_all(&self.pool).await?;
        Ok((collect(rows)?, to_count(total)))
    }

    async fn cancel_order(&self, id: OrderId, at: DateTime<Utc>) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = 'cancelled', updated_at = $2 \
             WHERE id = $1 AND status NOT IN ('delivered', 'cancelled') RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let order = match row {
            Some(row) => Order::try_from(row)?,
            None => {
                let status: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
                return match status {
                    Some(status) => Err(StoreError::InvalidState(format!("order is {status}"))),
                    None => Err(StoreError::NotFound),
                };
            }
        };

        for item in &order.items {
            match apply_stock_delta(&mut tx, item.product, i64::from(item.quantity)).await {
                Ok(_) | Err(StoreError::NotFound) => {}
                Err(err) => return Err(err),
            }
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn update_order_status(&self, order: &Order, expected: OrderStatus) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, tracking_number = $3, delivered_at = $4, updated_at = $5 \
             WHERE id = $1 AND status = $6",
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(&order.tracking_number)
        .bind(order.delivered_at)
        .bind(order.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(order.id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        match status {
            Some(status) => Err(StoreError::InvalidState(format!("order is {status}"))),
            None => Err(StoreError::NotFound),
        }
    }

    async fn count_orders(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders").fetch_one(&self.pool).await?;
        Ok(to_count(count))
    }

    async fn completed_revenue(&self) -> StoreResult<Money> {
        let sum: Decimal =
            sqlx::query_scalar("SELECT COALESCE(SUM(total_price), 0) FROM orders WHERE payment_status = 'completed'")
                .fetch_one(&self.pool)
                .await?;
        Ok(Money::new(sum))
    }

    async fn orders_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE created_at >= $1 ORDER BY created_at ASC"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }
}

// =============================================================================
// Users
// =============================================================================

fn push_user_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    qb.push(" WHERE TRUE");
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(active) = filter.is_active {
        qb.push(" AND is_active = ").push_bind(active);
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(&format!("INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"))
            .bind(user.id.as_uuid())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.role.as_str())
            .bind(user.is_active)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or_database(e, || format!("user {} already exists", user.email)))?;
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_token(&self, token: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.role, u.is_active, u.created_at, \
             u.updated_at FROM user_tokens t JOIN users u ON u.id = t.user_id WHERE t.token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn issue_token(&self, user: UserId, token: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO user_tokens (token, user_id) VALUES ($1, $2)")
            .bind(token)
            .bind(user.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or_database(e, || "token already issued".to_owned()))?;
        Ok(())
    }

    async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> StoreResult<(Vec<User>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_user_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_user_filters(&mut select, filter);
        select.push(" ORDER BY created_at DESC, id ASC LIMIT ").push_bind(i64::from(page.limit));
        select.push(" OFFSET ").push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows: Vec<UserRow> = select.build_query_as().fetch_all(&self.pool).await?;
        Ok((collect(rows)?, to_count(total)))
    }

    async fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(active)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn count_users(&self, role: Role) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(to_count(count))
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
