//! Bearer-token extractors.
//!
//! Tokens are issued by the identity collaborator and resolved through
//! [`UserStore::find_user_by_token`](crate::store::UserStore::find_user_by_token).

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::AppState;
use crate::domain::User;
use crate::error::{EcommerceError, Result};

/// Requires a signed-in, active account.
pub struct CurrentUser(pub User);

/// Requires an active account with the admin role.
pub struct AdminUser(pub User);

/// The caller's account when a valid token is present; never rejects.
pub struct OptionalUser(pub Option<User>);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn resolve(parts: &Parts, state: &AppState) -> Result<User> {
    let token = bearer_token(parts).ok_or(EcommerceError::Unauthorized("Not authorized"))?;
    let user = state
        .store()
        .find_user_by_token(token)
        .await?
        .ok_or(EcommerceError::Unauthorized("Not authorized"))?;
    if !user.is_active {
        tracing::warn!(user_id = %user.id, "deactivated account presented a token");
        return Err(EcommerceError::Unauthorized("Account is deactivated"));
    }
    Ok(user)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        resolve(parts, state).await.map(Self)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = resolve(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "admin route refused");
            return Err(EcommerceError::Forbidden("Admin access required"));
        }
        Ok(Self(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self(resolve(parts, state).await.ok()))
    }
}
