//! Request extractors that answer with the storefront error envelope.

use std::str::FromStr;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{EcommerceError, FieldError, Result};
use crate::pagination::PageRequest;

/// `Json<T>` whose rejection is a 400 `Invalid request body` instead of
/// axum's plain-text answer.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = EcommerceError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::warn!(reason = %rejection.body_text(), "rejected request body");
                Err(EcommerceError::BadRequest("Invalid request body".into()))
            }
        }
    }
}

/// Parses a path identifier. Malformed ids are reported as missing.
pub fn parse_id<T: FromStr>(raw: &str, resource: &'static str) -> Result<T> {
    raw.parse().map_err(|_| EcommerceError::NotFound(resource))
}

/// Collects per-field problems found while reading query strings.
#[derive(Default)]
pub struct QueryErrors(Vec<FieldError>);

impl QueryErrors {
    pub fn push(&mut self, field: &str, message: &str) {
        self.0.push(FieldError::new(field, message));
    }

    /// Parses an optional value; a present but unparsable one is recorded.
    pub fn parse<T: FromStr>(&mut self, field: &str, raw: Option<&str>, message: &str) -> Option<T> {
        let raw = raw.map(str::trim).filter(|v| !v.is_empty())?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.push(field, message);
                None
            }
        }
    }

    /// `page >= 1` and `1 <= limit <= max_limit`.
    pub fn page(&mut self, page: Option<&str>, limit: Option<&str>, default_limit: u32, max_limit: u32) -> PageRequest {
        let page = match self.parse::<u32>("page", page, "Page must be a positive integer") {
            Some(0) => {
                self.push("page", "Page must be a positive integer");
                1
            }
            Some(page) => page,
            None => 1,
        };
        let limit_message = format!("Limit must be between 1 and {max_limit}");
        let limit = match self.parse::<u32>("limit", limit, &limit_message) {
            Some(limit) if (1..=max_limit).contains(&limit) => limit,
            Some(_) => {
                self.push("limit", &limit_message);
                default_limit
            }
            None => default_limit,
        };
        PageRequest::new(page, limit)
    }

    pub fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(EcommerceError::Validation(self.0))
        }
    }
}
