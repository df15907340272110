//! Generic `/auth/:actor_type/:auth_provider` routes.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use service_core::error::AppError;
use std::collections::HashMap;

use crate::dtos::{
    auth::{LocationResponse, ResetPasswordRequest, TokenResponse},
    SuccessResponse,
};
use crate::middleware::bearer_token;
use crate::models::event::PasswordReset;
use crate::models::{DomainEvent, EventEnvelope};
use crate::services::{ActorType, AuthOutcome, AuthRequest, AuthResult, TokenPurpose};
use crate::utils::{normalize_email, JsonBody, ValidatedJson};
use crate::AppState;

const RESET_TOKEN_TTL_MINUTES: i64 = 15;

fn auth_response(result: AuthResult) -> Response {
    match result {
        AuthResult::Token(token) => Json(TokenResponse { token }).into_response(),
        AuthResult::Location(location) => Json(LocationResponse { location }).into_response(),
    }
}

fn parse_actor_type(actor_type: &str) -> Result<ActorType, AppError> {
    actor_type.parse().map_err(AppError::InvalidData)
}

/// Authenticate an actor with a provider
///
/// Customer emailpass logins are refused until the email is verified.
#[utoipa::path(
    post,
    path = "/auth/{actor_type}/{auth_provider}",
    params(
        ("actor_type" = String, Path, description = "Actor type, e.g. customer"),
        ("auth_provider" = String, Path, description = "Auth provider, e.g. emailpass")
    ),
    request_body = EmailPassCredentials,
    responses(
        (status = 200, description = "Authenticated, or redirect location for the provider", body = TokenResponse),
        (status = 401, description = "Invalid credentials or unverified email", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn authenticate(
    State(state): State<AppState>,
    Path((actor_type, auth_provider)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    JsonBody(body): JsonBody,
) -> Result<Response, AppError> {
    let request = AuthRequest { body, query };
    let result = state
        .login
        .authenticate_actor(&actor_type, &auth_provider, &request)
        .await?;
    Ok(auth_response(result))
}

/// Register credentials with a provider
///
/// The returned token has no actor yet; it is exchanged for a customer via
/// `POST /store/customers`.
#[utoipa::path(
    post,
    path = "/auth/{actor_type}/{auth_provider}/register",
    params(
        ("actor_type" = String, Path, description = "Actor type, e.g. customer"),
        ("auth_provider" = String, Path, description = "Auth provider, e.g. emailpass")
    ),
    request_body = EmailPassCredentials,
    responses(
        (status = 200, description = "Registration token", body = TokenResponse),
        (status = 401, description = "Registration refused", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    Path((actor_type, auth_provider)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    JsonBody(body): JsonBody,
) -> Result<Response, AppError> {
    let request = AuthRequest { body, query };

    match state.auth.register(&auth_provider, &request).await? {
        AuthOutcome::Authenticated(identity) => {
            let token = state
                .tokens
                .issue_app_token(&identity, &actor_type, &auth_provider)?;
            Ok(Json(TokenResponse { token }).into_response())
        }
        AuthOutcome::Redirect { location } => Ok(Json(LocationResponse { location }).into_response()),
        AuthOutcome::Failed(message) => Err(AppError::Unauthorized(message)),
    }
}

/// Request a password reset
///
/// Always answers 201 so the response does not reveal whether the account exists.
#[utoipa::path(
    post,
    path = "/auth/{actor_type}/{auth_provider}/reset-password",
    params(
        ("actor_type" = String, Path, description = "Actor type, e.g. customer"),
        ("auth_provider" = String, Path, description = "Auth provider, e.g. emailpass")
    ),
    request_body = ResetPasswordRequest,
    responses(
        (status = 201, description = "Reset requested"),
        (status = 400, description = "Missing identifier", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path((actor_type, auth_provider)): Path<(String, String)>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<StatusCode, AppError> {
    let actor = parse_actor_type(&actor_type)?;
    let entity_id = normalize_email(&req.identifier);

    let identity = match state.auth.find_identity(&auth_provider, &entity_id).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "Identity lookup failed during password reset");
            None
        }
    };

    let Some(identity) = identity else {
        tracing::info!(provider = %auth_provider, "Password reset for unknown identity");
        return Ok(StatusCode::CREATED);
    };

    let token = state.tokens.issue_action_token(
        &entity_id,
        &auth_provider,
        actor,
        TokenPurpose::PasswordReset,
        Duration::minutes(RESET_TOKEN_TTL_MINUTES),
    )?;

    let envelope = EventEnvelope::new(DomainEvent::PasswordReset(PasswordReset {
        entity_id,
        token,
        actor_type: actor.to_string(),
    }));

    if let Err(e) = state.events.publish(envelope) {
        tracing::error!(auth_identity_id = %identity.id, error = %e, "Failed to publish password reset");
    } else {
        tracing::info!(auth_identity_id = %identity.id, "Password reset requested");
    }

    Ok(StatusCode::CREATED)
}

/// Replace the provider credentials using a password reset token
#[utoipa::path(
    post,
    path = "/auth/{actor_type}/{auth_provider}/update",
    params(
        ("actor_type" = String, Path, description = "Actor type, e.g. customer"),
        ("auth_provider" = String, Path, description = "Auth provider, e.g. emailpass")
    ),
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Credentials updated", body = SuccessResponse),
        (status = 401, description = "Invalid or expired reset token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn update_provider(
    State(state): State<AppState>,
    Path((actor_type, auth_provider)): Path<(String, String)>,
    headers: HeaderMap,
    JsonBody(body): JsonBody,
) -> Result<Json<SuccessResponse>, AppError> {
    let actor = parse_actor_type(&actor_type)?;
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::unauthorized("Missing or invalid Authorization header"))?;

    let claims = state
        .tokens
        .validate_action_token(token, TokenPurpose::PasswordReset, actor)
        .map_err(|_| AppError::unauthorized("Invalid or expired reset token"))?;

    if claims.provider != auth_provider {
        return Err(AppError::unauthorized("Invalid or expired reset token"));
    }

    match state
        .auth
        .update_provider(&auth_provider, &claims.entity_id, &AuthRequest::from_body(body))
        .await?
    {
        AuthOutcome::Authenticated(_) => Ok(Json(SuccessResponse::ok())),
        AuthOutcome::Redirect { .. } => Err(AppError::unauthorized("Unsupported provider flow")),
        AuthOutcome::Failed(message) => Err(AppError::Unauthorized(message)),
    }
}
