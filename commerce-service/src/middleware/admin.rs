use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use subtle::ConstantTimeEq;

use crate::AppState;

pub const ADMIN_API_KEY_HEADER: &str = "x-admin-api-key";

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = headers
        .get(ADMIN_API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let expected = state.config.security.admin_api_key.expose_secret();

    if !provided.is_empty() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        return Ok(next.run(request).await);
    }

    tracing::warn!(path = %request.uri().path(), "Failed admin authentication attempt");
    Err(AppError::unauthorized("Invalid or missing admin API key"))
}
