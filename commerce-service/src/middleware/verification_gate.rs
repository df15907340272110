//! Pre-authentication gate for customer emailpass logins on the generic auth route.

use axum::{
    body::{to_bytes, Body},
    extract::{Query, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use service_core::error::AppError;
use std::collections::HashMap;

use crate::services::MissingCustomer;
use crate::utils::validation::{parse_json_body, string_field};
use crate::AppState;

pub const GATED_PATH: &str = "/auth/customer/emailpass";
const MAX_BODY_BYTES: usize = 64 * 1024;

fn is_gated(method: &Method, path: &str) -> bool {
    (method == Method::POST || method == Method::GET) && path.trim_end_matches('/') == GATED_PATH
}

/// Blocks logins for customers whose email still needs verification.
///
/// Emails with no customer record pass; the route repeats the check with a
/// stricter policy once it knows which identity authenticated.
pub async fn verification_gate_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !is_gated(request.method(), request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::invalid_data(format!("Invalid request body: {}", e)))?;

    // Malformed bodies are left for the handler to reject.
    let json = parse_json_body(&bytes).unwrap_or(Value::Null);
    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(query)| query)
        .unwrap_or_default();

    let email = string_field(&json, "email")
        .map(str::to_string)
        .or_else(|| {
            query
                .get("email")
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
        });

    if let Some(email) = email {
        state
            .verification
            .enforce(&email, MissingCustomer::Allow)
            .await?;
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
