use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::extract::{parse_id, JsonBody, QueryErrors};
use super::{AdminUser, ApiResponse, AppState, CurrentUser, OptionalUser};
use crate::domain::{Money, Product, ProductId, ProductImage, Sku, Specification, UserId};
use crate::error::Result;
use crate::services::{NewProduct, NewReview, ProductChanges};
use crate::store::{ProductQuery, ProductSort};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/categories/list", get(list_categories))
        .route("/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/products/:id/reviews", post(add_review))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub rating: Option<String>,
    pub brand: Option<String>,
    pub featured: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
}

impl ListParams {
    fn into_query(self) -> Result<ProductQuery> {
        let mut errors = QueryErrors::default();
        let page = errors.page(self.page.as_deref(), self.limit.as_deref(), 12, 50);

        let mut price = |field: &str, raw: Option<&str>, message: &str| {
            let value = errors.parse::<Money>(field, raw, message);
            if value.is_some_and(|v| v.is_negative()) {
                errors.push(field, message);
            }
            value
        };
        let min_price = price("minPrice", self.min_price.as_deref(), "Min price must be a positive number");
        let max_price = price("maxPrice", self.max_price.as_deref(), "Max price must be a positive number");

        let rating = errors.parse::<f64>("rating", self.rating.as_deref(), "Rating must be between 0 and 5");
        if rating.is_some_and(|r| !(0.0..=5.0).contains(&r)) {
            errors.push("rating", "Rating must be between 0 and 5");
        }
        errors.finish()?;

        let non_blank = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(ProductQuery {
            category: non_blank(self.category),
            min_price,
            max_price,
            min_rating: rating,
            brand: non_blank(self.brand),
            featured_only: self.featured.as_deref() == Some("true"),
            search: non_blank(self.search),
            sort: ProductSort::parse(self.sort.as_deref()),
            include_inactive: false,
            page,
        })
    }
}

/// Product as shown in listings: everything except the review bodies.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCard<'a> {
    pub id: ProductId,
    pub name: &'a str,
    pub description: &'a str,
    pub price: Money,
    pub original_price: Option<Money>,
    pub category: &'a str,
    pub subcategory: Option<&'a str>,
    pub brand: Option<&'a str>,
    pub sku: &'a Sku,
    pub images: &'a [ProductImage],
    pub stock: u32,
    pub low_stock_threshold: u32,
    pub is_active: bool,
    pub is_featured: bool,
    pub tags: &'a [String],
    pub features: &'a [String],
    pub specifications: &'a [Specification],
    pub average_rating: f64,
    pub total_reviews: u32,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a Product> for ProductCard<'a> {
    fn from(p: &'a Product) -> Self {
        Self {
            id: p.id,
            name: &p.name,
            description: &p.description,
            price: p.price,
            original_price: p.original_price,
            category: &p.category,
            subcategory: p.subcategory.as_deref(),
            brand: p.brand.as_deref(),
            sku: &p.sku,
            images: &p.images,
            stock: p.stock,
            low_stock_threshold: p.low_stock_threshold,
            is_active: p.is_active,
            is_featured: p.is_featured,
            tags: &p.tags,
            features: &p.features,
            specifications: &p.specifications,
            average_rating: p.average_rating,
            total_reviews: p.total_reviews,
            created_by: p.created_by,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<impl IntoResponse> {
    let query = p.into_query()?;
    let (products, pagination) = s.catalog().list(&query).await?;
    let cards: Vec<ProductCard<'_>> = products.iter().map(ProductCard::from).collect();
    Ok(ApiResponse::data(json!({ "products": cards, "pagination": pagination })))
}

async fn list_categories(State(s): State<AppState>) -> Result<impl IntoResponse> {
    let categories = s.catalog().categories().await?;
    Ok(ApiResponse::data(json!({ "categories": categories })))
}

async fn get_product(State(s): State<AppState>, OptionalUser(viewer): OptionalUser, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let product = s.catalog().get(parse_id(&id, "Product")?, viewer.as_ref()).await?;
    Ok(ApiResponse::data(json!({ "product": product })))
}

async fn create_product(State(s): State<AppState>, AdminUser(admin): AdminUser, JsonBody(r): JsonBody<NewProduct>) -> Result<impl IntoResponse> {
    let product = s.catalog().create(r, &admin).await?;
    Ok(ApiResponse::with_message("Product created successfully", json!({ "product": product })).created())
}

async fn update_product(
    State(s): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<String>,
    JsonBody(r): JsonBody<ProductChanges>,
) -> Result<impl IntoResponse> {
    let product = s.catalog().update(parse_id(&id, "Product")?, r).await?;
    Ok(ApiResponse::with_message("Product updated successfully", json!({ "product": product })))
}

async fn delete_product(State(s): State<AppState>, AdminUser(_): AdminUser, Path(id): Path<String>) -> Result<impl IntoResponse> {
    s.catalog().deactivate(parse_id(&id, "Product")?).await?;
    Ok(ApiResponse::message("Product deleted successfully"))
}

async fn add_review(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(r): JsonBody<NewReview>,
) -> Result<impl IntoResponse> {
    let outcome = s.catalog().add_review(parse_id(&id, "Product")?, &user, r).await?;
    let data = json!({
        "review": outcome.review,
        "averageRating": outcome.average_rating,
        "totalReviews": outcome.total_reviews,
    });
    Ok(ApiResponse::with_message("Review added successfully", data).created())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EcommerceError;

    #[test]
    fn list_params_map_to_a_query() {
        let params = ListParams {
            page: Some("2".into()),
            min_price: Some("10".into()),
            featured: Some("true".into()),
            sort: Some("price_desc".into()),
            search: Some("  ".into()),
            ..ListParams::default()
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.page.page, 2);
        assert_eq!(query.page.limit, 12);
        assert_eq!(query.min_price, Some(Money::whole(10)));
        assert!(query.featured_only);
        assert_eq!(query.sort, ProductSort::PriceDesc);
        assert_eq!(query.search, None);
    }

    #[test]
    fn bad_filters_are_all_reported() {
        let params = ListParams {
            limit: Some("500".into()),
            min_price: Some("-1".into()),
            rating: Some("7".into()),
            ..ListParams::default()
        };
        let Err(EcommerceError::Validation(fields)) = params.into_query() else { panic!("expected validation error") };
        let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(names, vec!["limit", "minPrice", "rating"]);
    }
}
