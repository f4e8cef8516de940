use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::{Validate, ValidationError};

use super::extract::{parse_id, JsonBody};
use super::{ApiResponse, AppState, CurrentUser};
use crate::domain::{CartId, Money, ProductId, ProductImage, UserId};
use crate::error::{EcommerceError, Result};
use crate::services::DetailedCart;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart/add", post(add_item))
        .route("/cart/update", put(update_item))
        .route("/cart/remove/:product_id", delete(remove_item))
        .route("/cart/clear", delete(clear_cart))
        .route("/cart/summary", get(cart_summary))
}

fn valid_product_id(value: &str) -> std::result::Result<(), ValidationError> {
    value.parse::<ProductId>().map(|_| ()).map_err(|_| {
        let mut error = ValidationError::new("product_id");
        error.message = Some("Valid product ID is required".into());
        error
    })
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct AddItem {
    #[validate(custom = "valid_product_id")]
    pub product_id: String,
    #[validate(
        required(message = "Quantity must be at least 1"),
        range(min = 1, max = 1_000_000, message = "Quantity must be at least 1")
    )]
    pub quantity: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateItem {
    #[validate(custom = "valid_product_id")]
    pub product_id: String,
    #[validate(
        required(message = "Quantity must be a non-negative integer"),
        range(min = 0, max = 1_000_000, message = "Quantity must be a non-negative integer")
    )]
    pub quantity: Option<i64>,
}

/// Reads a validated `(productId, quantity)` pair.
fn line(product_id: &str, quantity: Option<i64>) -> Result<(ProductId, u32)> {
    let product_id = product_id
        .parse()
        .map_err(|_| EcommerceError::validation("productId", "Valid product ID is required"))?;
    let quantity = quantity
        .and_then(|q| u32::try_from(q).ok())
        .ok_or_else(|| EcommerceError::validation("quantity", "Quantity must be a non-negative integer"))?;
    Ok((product_id, quantity))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct<'a> {
    pub id: ProductId,
    pub name: &'a str,
    pub price: Money,
    pub images: &'a [ProductImage],
    pub stock: u32,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine<'a> {
    pub product: CartProduct<'a>,
    pub quantity: u32,
    pub price: Money,
}

/// The cart as the shopper sees it. Lines whose product has gone missing
/// or inactive are left out, and the totals cover the visible lines only.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView<'a> {
    pub id: CartId,
    pub user: UserId,
    pub items: Vec<CartLine<'a>>,
    pub total_items: u32,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a DetailedCart> for CartView<'a> {
    fn from(detailed: &'a DetailedCart) -> Self {
        let items: Vec<CartLine<'a>> = detailed
            .cart
            .items()
            .iter()
            .filter_map(|item| {
                let product = detailed.products.get(&item.product_id).filter(|p| p.is_active)?;
                Some(CartLine {
                    product: CartProduct {
                        id: product.id,
                        name: &product.name,
                        price: product.price,
                        images: &product.images,
                        stock: product.stock,
                        is_active: product.is_active,
                    },
                    quantity: item.quantity,
                    price: item.price,
                })
            })
            .collect();
        Self {
            id: detailed.cart.id(),
            user: detailed.cart.user_id(),
            total_items: items.iter().fold(0u32, |acc, l| acc.saturating_add(l.quantity)),
            total_amount: items.iter().map(|l| l.price.multiply(l.quantity)).sum(),
            items,
            created_at: detailed.cart.created_at(),
            updated_at: detailed.cart.updated_at(),
        }
    }
}

async fn get_cart(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<impl IntoResponse> {
    let detailed = s.carts().detailed(user.id).await?;
    Ok(ApiResponse::data(json!({ "cart": CartView::from(&detailed) })))
}

async fn add_item(State(s): State<AppState>, CurrentUser(user): CurrentUser, JsonBody(r): JsonBody<AddItem>) -> Result<impl IntoResponse> {
    r.validate()?;
    let (product_id, quantity) = line(&r.product_id, r.quantity)?;
    let detailed = s.carts().add(user.id, product_id, quantity).await?;
    Ok(ApiResponse::with_message("Item added to cart successfully", json!({ "cart": CartView::from(&detailed) })))
}

async fn update_item(State(s): State<AppState>, CurrentUser(user): CurrentUser, JsonBody(r): JsonBody<UpdateItem>) -> Result<impl IntoResponse> {
    r.validate()?;
    let (product_id, quantity) = line(&r.product_id, r.quantity)?;
    let detailed = s.carts().update(user.id, product_id, quantity).await?;
    let message = if quantity == 0 { "Item removed from cart" } else { "Cart updated successfully" };
    Ok(ApiResponse::with_message(message, json!({ "cart": CartView::from(&detailed) })))
}

async fn remove_item(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(product_id): Path<String>) -> Result<impl IntoResponse> {
    let product_id = product_id
        .parse()
        .map_err(|_| EcommerceError::validation("productId", "Valid product ID is required"))?;
    let detailed = s.carts().remove(user.id, product_id).await?;
    Ok(ApiResponse::with_message("Item removed from cart successfully", json!({ "cart": CartView::from(&detailed) })))
}

async fn clear_cart(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<impl IntoResponse> {
    let cart = s.carts().clear(user.id).await?;
    Ok(ApiResponse::with_message("Cart cleared successfully", json!({ "cart": cart })))
}

async fn cart_summary(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<impl IntoResponse> {
    let summary = s.carts().summary(user.id).await?;
    Ok(ApiResponse::data(summary))
}
