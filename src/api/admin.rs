use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use validator::{Validate, ValidationError};

use super::extract::{parse_id, JsonBody, QueryErrors};
use super::orders::OrderView;
use super::{AdminUser, ApiResponse, AppState};
use crate::domain::{OrderStatus, Role};
use crate::error::{EcommerceError, Result};
use crate::services::Period;
use crate::store::{OrderFilter, UserFilter};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/orders", get(list_orders))
        .route("/admin/orders/:id/status", put(update_order_status))
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id/toggle-status", put(toggle_user))
        .route("/admin/analytics/sales", get(sales_analytics))
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodParams {
    pub period: Option<String>,
}

fn known_status(value: &str) -> std::result::Result<(), ValidationError> {
    value.parse::<OrderStatus>().map(|_| ()).map_err(|_| {
        let mut error = ValidationError::new("status");
        error.message = Some("Invalid status".into());
        error
    })
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct StatusChange {
    #[validate(custom = "known_status")]
    pub status: String,
    pub tracking_number: Option<String>,
}

async fn dashboard(State(s): State<AppState>, AdminUser(_): AdminUser) -> Result<impl IntoResponse> {
    Ok(ApiResponse::data(s.reporting().dashboard().await?))
}

async fn list_orders(State(s): State<AppState>, AdminUser(_): AdminUser, Query(p): Query<OrderParams>) -> Result<impl IntoResponse> {
    let mut errors = QueryErrors::default();
    let page = errors.page(p.page.as_deref(), p.limit.as_deref(), 20, 100);
    let status = errors.parse::<OrderStatus>("status", p.status.as_deref(), "Invalid status");
    errors.finish()?;

    let (orders, pagination) = s.checkout().list(&OrderFilter { user: None, status }, page).await?;
    let views: Vec<OrderView<'_>> = orders.iter().map(OrderView::from).collect();
    Ok(ApiResponse::data(json!({ "orders": views, "pagination": pagination })))
}

async fn update_order_status(
    State(s): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    JsonBody(r): JsonBody<StatusChange>,
) -> Result<impl IntoResponse> {
    r.validate()?;
    let status = r
        .status
        .parse::<OrderStatus>()
        .map_err(|_| EcommerceError::validation("status", "Invalid status"))?;
    let order = s.checkout().update_status(parse_id(&id, "Order")?, status, r.tracking_number).await?;
    tracing::debug!(admin_id = %admin.id, order_id = %order.id, "status change applied");
    Ok(ApiResponse::with_message("Order status updated successfully", json!({ "order": OrderView::from(&order) })))
}

async fn list_users(State(s): State<AppState>, AdminUser(_): AdminUser, Query(p): Query<UserParams>) -> Result<impl IntoResponse> {
    let mut errors = QueryErrors::default();
    let page = errors.page(p.page.as_deref(), p.limit.as_deref(), 20, 100);
    let role = errors.parse::<Role>("role", p.role.as_deref(), "Invalid role");
    let is_active = errors.parse::<bool>("isActive", p.is_active.as_deref(), "isActive must be true or false");
    errors.finish()?;

    let (users, pagination) = s.reporting().list_users(&UserFilter { role, is_active }, page).await?;
    Ok(ApiResponse::data(json!({ "users": users, "pagination": pagination })))
}

async fn toggle_user(State(s): State<AppState>, AdminUser(admin): AdminUser, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let user = s.reporting().toggle_user(&admin, parse_id(&id, "User")?).await?;
    let message = if user.is_active { "User activated successfully" } else { "User deactivated successfully" };
    Ok(ApiResponse::with_message(message, json!({ "user": { "id": user.id, "isActive": user.is_active } })))
}

async fn sales_analytics(State(s): State<AppState>, AdminUser(_): AdminUser, Query(p): Query<PeriodParams>) -> Result<impl IntoResponse> {
    let analytics = s.reporting().sales(Period::parse(p.period.as_deref())).await?;
    Ok(ApiResponse::data(analytics))
}
