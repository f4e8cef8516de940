use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::extract::{parse_id, JsonBody, QueryErrors};
use super::{ApiResponse, AppState, CurrentUser};
use crate::domain::{Order, OrderSummary};
use crate::error::Result;
use crate::services::{PaymentRequest, PlaceOrder};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(place_order))
        .route("/orders/payment/process", post(process_payment))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", put(cancel_order))
}

/// An order with its derived summary block.
#[derive(Debug, Serialize)]
pub struct OrderView<'a> {
    #[serde(flatten)]
    pub order: &'a Order,
    pub summary: OrderSummary,
}

impl<'a> From<&'a Order> for OrderView<'a> {
    fn from(order: &'a Order) -> Self {
        Self { order, summary: order.summary() }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

async fn place_order(State(s): State<AppState>, CurrentUser(user): CurrentUser, JsonBody(r): JsonBody<PlaceOrder>) -> Result<impl IntoResponse> {
    let order = s.checkout().place_order(&user, r).await?;
    Ok(ApiResponse::with_message("Order created successfully", json!({ "order": OrderView::from(&order) })).created())
}

async fn list_orders(State(s): State<AppState>, CurrentUser(user): CurrentUser, Query(p): Query<PageParams>) -> Result<impl IntoResponse> {
    let mut errors = QueryErrors::default();
    let page = errors.page(p.page.as_deref(), p.limit.as_deref(), 10, 100);
    errors.finish()?;

    let (orders, pagination) = s.checkout().list_for_user(&user, page).await?;
    let views: Vec<OrderView<'_>> = orders.iter().map(OrderView::from).collect();
    Ok(ApiResponse::data(json!({ "orders": views, "pagination": pagination })))
}

async fn get_order(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let order = s.checkout().get(&user, parse_id(&id, "Order")?).await?;
    Ok(ApiResponse::data(json!({ "order": OrderView::from(&order) })))
}

async fn cancel_order(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let order = s.checkout().cancel(&user, parse_id(&id, "Order")?).await?;
    Ok(ApiResponse::with_message("Order cancelled successfully", json!({ "order": OrderView::from(&order) })))
}

async fn process_payment(State(s): State<AppState>, CurrentUser(user): CurrentUser, JsonBody(r): JsonBody<PaymentRequest>) -> Result<impl IntoResponse> {
    let receipt = s.payments().process(r)?;
    tracing::info!(user_id = %user.id, transaction_id = %receipt.transaction_id, "payment simulated");
    Ok(ApiResponse::with_message("Payment processed successfully", receipt))
}
