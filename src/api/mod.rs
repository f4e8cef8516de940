//! HTTP surface: router, shared state and the success envelope.

mod admin;
mod auth;
mod cart;
mod extract;
mod orders;
mod products;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::services::{CartService, CatalogService, CheckoutService, PaymentSimulator, ReportingService};
use crate::store::SharedStore;

pub use auth::{AdminUser, CurrentUser, OptionalUser};
pub use extract::JsonBody;

/// Application state shared across all handlers; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: SharedStore,
    catalog: CatalogService,
    carts: CartService,
    checkout: CheckoutService,
    payments: PaymentSimulator,
    reporting: ReportingService,
}

impl AppState {
    pub fn new(config: Config, store: SharedStore) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                catalog: CatalogService::new(store.clone()),
                carts: CartService::new(store.clone()),
                checkout: CheckoutService::new(store.clone(), config.pricing.clone(), config.status_policy),
                payments: PaymentSimulator::new(config.payment_success_rate),
                reporting: ReportingService::new(store.clone()),
                store,
                config,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.inner.store
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    pub fn carts(&self) -> &CartService {
        &self.inner.carts
    }

    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    pub fn payments(&self) -> &PaymentSimulator {
        &self.inner.payments
    }

    pub fn reporting(&self) -> &ReportingService {
        &self.inner.reporting
    }
}

/// Success envelope: `{success: true, message?, data?}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self { success: true, message: None, data: Some(data) }
    }

    pub fn with_message(message: &'static str, data: T) -> Self {
        Self { success: true, message: Some(message), data: Some(data) }
    }

    /// Same envelope answered with `201 Created`.
    pub fn created(self) -> (StatusCode, Self) {
        (StatusCode::CREATED, self)
    }
}

impl ApiResponse<()> {
    pub fn message(message: &'static str) -> Self {
        Self { success: true, message: Some(message), data: None }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(products::routes())
        .merge(cart::routes())
        .merge(orders::routes())
        .merge(admin::routes());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe.
async fn health() -> &'static str {
    "ok"
}

/// Readiness probe: answers 503 while the store is unreachable.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.store().ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::error!(backend = state.store().backend(), error = %e, "store readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        }
    }
}
