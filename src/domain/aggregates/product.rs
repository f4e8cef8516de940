//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::value_objects::{Money, ProductId, Sku, UserId};

pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub original_price: Option<Money>,
    pub category: String,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub sku: Sku,
    pub images: Vec<ProductImage>,
    pub stock: u32,
    pub low_stock_threshold: u32,
    pub is_active: bool,
    pub is_featured: bool,
    pub tags: Vec<String>,
    pub features: Vec<String>,
    pub specifications: Vec<Specification>,
    pub reviews: Vec<Review>,
    pub average_rating: f64,
    pub total_reviews: u32,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    pub url: String,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub user: UserId,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn create(
        sku: Sku,
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        price: Money,
        stock: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::generate(), name: name.into(), description: description.into(), price,
            original_price: None, category: category.into(), subcategory: None, brand: None, sku,
            images: vec![], stock, low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            is_active: true, is_featured: false, tags: vec![], features: vec![], specifications: vec![],
            reviews: vec![], average_rating: 0.0, total_reviews: 0, created_by: None,
            created_at: now, updated_at: now,
        }
    }

    pub fn is_low_on_stock(&self) -> bool { self.stock <= self.low_stock_threshold }

    /// URL of the first image, or an empty string for products without one.
    pub fn primary_image_url(&self) -> &str {
        self.images.first().map_or("", |image| image.url.as_str())
    }

    pub fn has_review_from(&self, user: UserId) -> bool { self.reviews.iter().any(|r| r.user == user) }

    /// Appends a review and recomputes the rating aggregate.
    pub fn add_review(&mut self, user: UserId, rating: u8, comment: impl Into<String>) -> Result<Review, ProductError> {
        if !(1..=5).contains(&rating) { return Err(ProductError::InvalidRating(rating)); }
        if self.has_review_from(user) { return Err(ProductError::AlreadyReviewed); }
        let review = Review { user, rating, comment: comment.into(), created_at: Utc::now() };
        self.reviews.push(review.clone());
        self.recalculate_rating();
        self.touch();
        Ok(review)
    }

    /// Soft delete: the product disappears from the storefront but stays
    /// referenced by historical orders.
    pub fn deactivate(&mut self) { self.is_active = false; self.touch(); }

    fn recalculate_rating(&mut self) {
        let count = self.reviews.len();
        self.total_reviews = u32::try_from(count).unwrap_or(u32::MAX);
        self.average_rating = if count == 0 {
            0.0
        } else {
            let sum: u32 = self.reviews.iter().map(|r| u32::from(r.rating)).sum();
            f64::from(sum) / count as f64
        };
    }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("You have already reviewed this product")]
    AlreadyReviewed,
    #[error("Rating must be between 1 and 5 (got {0})")]
    InvalidRating(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Product {
        Product::create(Sku::new("TEST-001").unwrap(), "Test Product", "A widget", "Gadgets", Money::cents(1999), 5)
    }

    #[test]
    fn test_product_create() {
        let p = widget();
        assert_eq!(p.name, "Test Product");
        assert!(p.is_active);
        assert_eq!(p.low_stock_threshold, DEFAULT_LOW_STOCK_THRESHOLD);
        assert!(p.is_low_on_stock());
        assert_eq!(p.primary_image_url(), "");
    }

    #[test]
    fn test_average_is_mean_of_all_reviews() {
        let mut p = widget();
        for rating in [5, 4, 2] {
            p.add_review(UserId::generate(), rating, "ok").unwrap();
        }
        assert_eq!(p.total_reviews, 3);
        assert!((p.average_rating - 11.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_second_review_from_same_user_rejected() {
        let mut p = widget();
        let user = UserId::generate();
        p.add_review(user, 5, "great").unwrap();
        assert_eq!(p.add_review(user, 1, "changed my mind"), Err(ProductError::AlreadyReviewed));
        assert_eq!(p.total_reviews, 1);
        assert!((p.average_rating - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rating_bounds() {
        let mut p = widget();
        assert_eq!(p.add_review(UserId::generate(), 0, "x"), Err(ProductError::InvalidRating(0)));
        assert_eq!(p.add_review(UserId::generate(), 6, "x"), Err(ProductError::InvalidRating(6)));
    }
}
