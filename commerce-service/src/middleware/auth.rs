use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use service_core::error::AppError;

use crate::services::AppTokenClaims;
use crate::AppState;

/// Raw bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Claims of a valid application token; rejects the request otherwise.
pub struct AuthContext(pub AppTokenClaims);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Missing or invalid Authorization header"))?;

        let claims = state
            .tokens
            .validate_app_token(token)
            .map_err(|_| AppError::unauthorized("Invalid or expired token"))?;

        Ok(AuthContext(claims))
    }
}

/// Like [`AuthContext`], but a missing or invalid token yields `None`.
pub struct OptionalAuthContext(pub Option<AppTokenClaims>);

#[axum::async_trait]
impl FromRequestParts<AppState> for OptionalAuthContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = bearer_token(&parts.headers).and_then(|token| {
            state
                .tokens
                .validate_app_token(token)
                .map_err(|e| tracing::debug!(error = %e, "Ignoring invalid bearer token"))
                .ok()
        });
        Ok(OptionalAuthContext(claims))
    }
}
