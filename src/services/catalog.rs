//! Product catalog: listing, admin maintenance, reviews and stock.

use std::borrow::Cow;

use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::domain::{Money, Product, ProductId, ProductImage, Review, Sku, Specification, User, DEFAULT_LOW_STOCK_THRESHOLD};
use crate::error::{EcommerceError, Result};
use crate::pagination::Pagination;
use crate::store::{ProductQuery, SharedStore, StoreError};

/// Payload for creating a product.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct NewProduct {
    #[validate(custom = "not_blank_name")]
    pub name: String,
    #[validate(custom = "not_blank_description")]
    pub description: String,
    #[validate(custom = "non_negative_price")]
    pub price: Option<Money>,
    #[validate(custom = "non_negative_price")]
    pub original_price: Option<Money>,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    #[validate(custom = "not_blank_sku")]
    pub sku: String,
    pub images: Vec<ProductImage>,
    #[validate(range(min = 0, max = 1_000_000_000, message = "Stock must be a non-negative integer"))]
    pub stock: Option<i64>,
    #[validate(range(min = 0, max = 1_000_000_000, message = "Low stock threshold must be a non-negative integer"))]
    pub low_stock_threshold: Option<i64>,
    pub is_featured: bool,
    pub tags: Vec<String>,
    pub features: Vec<String>,
    pub specifications: Vec<Specification>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductChanges {
    #[validate(custom = "not_blank_name")]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "non_negative_price")]
    pub price: Option<Money>,
    #[validate(custom = "non_negative_price")]
    pub original_price: Option<Money>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub images: Option<Vec<ProductImage>>,
    #[validate(range(min = 0, max = 1_000_000_000, message = "Stock must be a non-negative integer"))]
    pub stock: Option<i64>,
    #[validate(range(min = 0, max = 1_000_000_000, message = "Low stock threshold must be a non-negative integer"))]
    pub low_stock_threshold: Option<i64>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub features: Option<Vec<String>>,
    pub specifications: Option<Vec<Specification>>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct NewReview {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i64>,
    #[validate(custom = "not_blank_comment")]
    pub comment: String,
}

/// A stored review together with the product's refreshed aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub review: Review,
    pub average_rating: f64,
    pub total_reviews: u32,
}

fn rejected(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

fn not_blank(value: &str, message: &'static str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() { Err(rejected("required", message)) } else { Ok(()) }
}

fn not_blank_name(value: &str) -> std::result::Result<(), ValidationError> {
    not_blank(value, "Product name is required")
}

fn not_blank_description(value: &str) -> std::result::Result<(), ValidationError> {
    not_blank(value, "Product description is required")
}

fn not_blank_sku(value: &str) -> std::result::Result<(), ValidationError> {
    not_blank(value, "SKU is required")
}

fn not_blank_comment(value: &str) -> std::result::Result<(), ValidationError> {
    not_blank(value, "Review comment is required")
}

fn non_negative_price(value: &Money) -> std::result::Result<(), ValidationError> {
    if value.is_negative() {
        return Err(rejected("range", "Price must be a positive number"));
    }
    if value.round_cents() != *value {
        return Err(rejected("precision", "Price cannot have more than 2 decimal places"));
    }
    Ok(())
}

/// Bounds are enforced by the request validators; this only guards the cast.
fn to_u32(value: i64, field: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| EcommerceError::validation(field, format!("{field} is out of range")))
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct CatalogService {
    store: SharedStore,
}

impl CatalogService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn list(&self, query: &ProductQuery) -> Result<(Vec<Product>, Pagination)> {
        let (products, total) = self.store.list_products(query).await?;
        Ok((products, Pagination::new(query.page, total)))
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        Ok(self.store.categories().await?)
    }

    /// Inactive products are only visible to admins.
    pub async fn get(&self, id: ProductId, viewer: Option<&User>) -> Result<Product> {
        let product = self.store.find_product(id).await?.ok_or(EcommerceError::NotFound("Product"))?;
        if !product.is_active && !viewer.is_some_and(User::is_admin) {
            return Err(EcommerceError::NotFound("Product"));
        }
        Ok(product)
    }

    pub async fn create(&self, input: NewProduct, creator: &User) -> Result<Product> {
        input.validate()?;
        let sku = Sku::new(input.sku).map_err(|e| EcommerceError::validation("sku", e.to_string()))?;
        if self.store.find_product_by_sku(&sku).await?.is_some() {
            return Err(EcommerceError::DuplicateSku);
        }

        let price = input.price.ok_or_else(|| EcommerceError::validation("price", "Price must be a positive number"))?;
        let stock = input
            .stock
            .ok_or_else(|| EcommerceError::validation("stock", "Stock must be a non-negative integer"))?;

        let mut product = Product::create(sku, input.name.trim(), input.description, input.category, price, to_u32(stock, "stock")?);
        product.original_price = input.original_price;
        product.subcategory = blank_to_none(input.subcategory);
        product.brand = blank_to_none(input.brand);
        product.images = input.images;
        product.low_stock_threshold = match input.low_stock_threshold {
            Some(threshold) => to_u32(threshold, "lowStockThreshold")?,
            None => DEFAULT_LOW_STOCK_THRESHOLD,
        };
        product.is_featured = input.is_featured;
        product.tags = input.tags;
        product.features = input.features;
        product.specifications = input.specifications;
        product.created_by = Some(creator.id);

        match self.store.insert_product(&product).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(EcommerceError::DuplicateSku),
            Err(err) => return Err(err.into()),
        }
        tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product)
    }

    /// Applies a partial update. A supplied stock value is written through
    /// `set_stock`; every other field through `update_product`.
    pub async fn update(&self, id: ProductId, changes: ProductChanges) -> Result<Product> {
        changes.validate()?;
        let mut product = self.store.find_product(id).await?.ok_or(EcommerceError::NotFound("Product"))?;

        if let Some(name) = changes.name { product.name = name.trim().to_string(); }
        if let Some(description) = changes.description { product.description = description; }
        if let Some(price) = changes.price { product.price = price; }
        if changes.original_price.is_some() { product.original_price = changes.original_price; }
        if let Some(category) = changes.category.filter(|c| !c.trim().is_empty()) { product.category = category; }
        if changes.subcategory.is_some() { product.subcategory = blank_to_none(changes.subcategory); }
        if changes.brand.is_some() { product.brand = blank_to_none(changes.brand); }
        if let Some(images) = changes.images { product.images = images; }
        if let Some(threshold) = changes.low_stock_threshold {
            product.low_stock_threshold = to_u32(threshold, "lowStockThreshold")?;
        }
        if let Some(active) = changes.is_active { product.is_active = active; }
        if let Some(featured) = changes.is_featured { product.is_featured = featured; }
        if let Some(tags) = changes.tags { product.tags = tags; }
        if let Some(features) = changes.features { product.features = features; }
        if let Some(specifications) = changes.specifications { product.specifications = specifications; }
        product.touch();

        self.store.update_product(&product).await.map_err(|err| match err {
            StoreError::NotFound => EcommerceError::NotFound("Product"),
            other => other.into(),
        })?;

        if let Some(stock) = changes.stock {
            let stock = to_u32(stock, "stock")?;
            self.store.set_stock(id, stock).await?;
            product.stock = stock;
        }
        Ok(product)
    }

    /// Soft delete.
    pub async fn deactivate(&self, id: ProductId) -> Result<()> {
        let mut product = self.store.find_product(id).await?.ok_or(EcommerceError::NotFound("Product"))?;
        product.deactivate();
        self.store.update_product(&product).await?;
        tracing::info!(product_id = %id, "product deactivated");
        Ok(())
    }

    pub async fn add_review(&self, id: ProductId, author: &User, input: NewReview) -> Result<ReviewOutcome> {
        input.validate()?;
        let rating = input
            .rating
            .and_then(|r| u8::try_from(r).ok())
            .ok_or_else(|| EcommerceError::validation("rating", "Rating must be between 1 and 5"))?;

        let mut product = self.store.find_product(id).await?.ok_or(EcommerceError::NotFound("Product"))?;
        let review = product.add_review(author.id, rating, input.comment.trim())?;
        self.store.update_product(&product).await?;

        tracing::info!(product_id = %id, user_id = %author.id, rating, "review added");
        Ok(ReviewOutcome { review, average_rating: product.average_rating, total_reviews: product.total_reviews })
    }

    /// Signed, conditional stock change; never drops below zero.
    pub async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<u32> {
        match self.store.adjust_stock(id, delta).await {
            Ok(stock) => Ok(stock),
            Err(StoreError::NotFound) => Err(EcommerceError::NotFound("Product")),
            Err(StoreError::InsufficientStock { .. }) => {
                let product = self.store.find_product(id).await?.ok_or(EcommerceError::NotFound("Product"))?;
                Err(EcommerceError::InsufficientStock { name: product.name, available: product.stock })
            }
            Err(err) => Err(err.into()),
        }
    }
}
