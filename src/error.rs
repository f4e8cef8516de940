//! Unified error handling.
//!
//! Every service and handler returns `Result<T, EcommerceError>`. The
//! `IntoResponse` impl renders the JSON envelope
//! `{success: false, message, errors?}` and logs server-side failures
//! before answering with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::domain::{CartError, OrderError, OrderStatus, ProductError};
use crate::store::StoreError;

/// One rejected input field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum EcommerceError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// Malformed request that has no per-field breakdown.
    #[error("{0}")]
    BadRequest(String),

    /// Names the missing resource, e.g. `"Product"`.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product {name} is no longer available")]
    ProductUnavailable { name: String },

    #[error("Insufficient stock for {name}. Only {available} available")]
    InsufficientStock { name: String, available: u32 },

    #[error("Only {available} items available in stock")]
    StockExceeded { available: u32 },

    #[error("Product with this SKU already exists")]
    DuplicateSku,

    #[error("You have already reviewed this product")]
    DuplicateReview,

    #[error("Order cannot be cancelled")]
    OrderNotCancellable,

    #[error("Cannot change order status from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Payment failed. Please try again.")]
    PaymentDeclined,

    #[error("Item not found in cart")]
    ItemNotInCart,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

impl EcommerceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, errors) = match self {
            Self::Storage(err) => {
                tracing::error!(error = %err, "Request failed");
                ("Internal server error".to_string(), None)
            }
            Self::Validation(errors) => ("Validation failed".to_string(), Some(errors)),
            other => (other.to_string(), None),
        };

        (status, Json(ErrorBody { success: false, message, errors })).into_response()
    }
}

impl From<ProductError> for EcommerceError {
    fn from(err: ProductError) -> Self {
        match err {
            ProductError::AlreadyReviewed => Self::DuplicateReview,
            ProductError::InvalidRating(_) => Self::validation("rating", "Rating must be between 1 and 5"),
        }
    }
}

impl From<CartError> for EcommerceError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ItemNotFound => Self::ItemNotInCart,
        }
    }
}

impl From<OrderError> for EcommerceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::CannotCancel(_) => Self::OrderNotCancellable,
            OrderError::TransitionNotAllowed { from, to } => Self::InvalidStatusTransition { from, to },
        }
    }
}

impl From<ValidationErrors> for EcommerceError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = Vec::new();
        flatten_validation_errors(&errors, "", &mut fields);
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        Self::Validation(fields)
    }
}

/// Walks nested struct/list errors, producing dotted camelCase paths such
/// as `shippingAddress.zipCode` or `items[0].quantity`.
fn flatten_validation_errors(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            camel_case(field)
        } else {
            format!("{prefix}.{}", camel_case(field))
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                for error in list {
                    let message = error
                        .message
                        .as_ref()
                        .map_or_else(|| format!("{path} is invalid"), ToString::to_string);
                    out.push(FieldError::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(nested) => flatten_validation_errors(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    flatten_validation_errors(nested, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Address {
        #[validate(length(min = 1, message = "ZIP code is required"))]
        zip_code: String,
    }

    #[derive(Validate)]
    struct Checkout {
        #[validate]
        shipping_address: Address,
        #[validate(length(max = 5, message = "Notes too long"))]
        notes: String,
    }

    #[test]
    fn nested_errors_are_flattened_with_camel_case_paths() {
        let input = Checkout { shipping_address: Address { zip_code: String::new() }, notes: "far too long".into() };
        let err = EcommerceError::from(input.validate().unwrap_err());
        let EcommerceError::Validation(fields) = err else { panic!("expected validation error") };
        assert_eq!(
            fields,
            vec![
                FieldError::new("notes", "Notes too long"),
                FieldError::new("shippingAddress.zipCode", "ZIP code is required"),
            ]
        );
    }

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(EcommerceError::EmptyCart.status(), StatusCode::BAD_REQUEST);
        assert_eq!(EcommerceError::NotFound("Order").status(), StatusCode::NOT_FOUND);
        assert_eq!(EcommerceError::Forbidden("Access denied").status(), StatusCode::FORBIDDEN);
        assert_eq!(EcommerceError::Unauthorized("Not authorized").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(EcommerceError::Storage(StoreError::NotFound).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn messages_name_the_product() {
        let err = EcommerceError::InsufficientStock { name: "Lamp".into(), available: 2 };
        assert_eq!(err.to_string(), "Insufficient stock for Lamp. Only 2 available");
        assert_eq!(EcommerceError::NotFound("Product").to_string(), "Product not found");
    }

    #[tokio::test]
    async fn storage_errors_hide_details() {
        let response = EcommerceError::Storage(StoreError::DataCorruption("bad row".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Internal server error");
    }
}
