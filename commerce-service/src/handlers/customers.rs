use axum::{extract::State, Json};
use serde_json::Value;
use service_core::error::AppError;

use crate::dtos::{
    auth::TokenResponse,
    customer::{
        CreateCustomerRequest, CustomerLoginRequest, CustomerResponse, SendVerificationRequest,
        VerifyEmailRequest,
    },
    SuccessResponse,
};
use crate::middleware::{AuthContext, OptionalAuthContext};
use crate::models::{verification, Metadata, NewCustomer, CUSTOMER_ID_KEY, EMAILPASS_PROVIDER};
use crate::services::{AppTokenClaims, ServiceError};
use crate::utils::{normalize_email, JsonBody, ValidatedJson};
use crate::AppState;

/// Create the customer for a freshly registered identity
#[utoipa::path(
    post,
    path = "/store/customers",
    request_body = CreateCustomerRequest,
    responses(
        (status = 200, description = "Customer created", body = CustomerResponse),
        (status = 400, description = "Invalid data or identity already has a customer", body = ErrorResponse),
        (status = 401, description = "Missing or invalid registration token", body = ErrorResponse),
        (status = 409, description = "Email already in use", body = ErrorResponse)
    ),
    tag = "Store",
    security(("bearer_auth" = []))
)]
pub async fn create_customer(
    State(state): State<AppState>,
    AuthContext(claims): AuthContext,
    ValidatedJson(req): ValidatedJson<CreateCustomerRequest>,
) -> Result<Json<CustomerResponse>, AppError> {
    let identity = state
        .auth
        .retrieve(&claims.auth_identity_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid or expired token"))?;

    if !claims.actor_id.is_empty() || identity.customer_id().is_some() {
        return Err(AppError::invalid_data(
            "Request already authenticated as a customer.",
        ));
    }

    let customer = state
        .stores
        .customers
        .create(NewCustomer {
            email: normalize_email(&req.email),
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
            metadata: verification::with_defaults(req.metadata.unwrap_or_default()),
        })
        .await
        .map_err(ServiceError::from)?;

    let mut link = Metadata::new();
    link.insert(CUSTOMER_ID_KEY.to_string(), Value::String(customer.id.clone()));
    state.auth.update_app_metadata(&identity.id, link).await?;

    tracing::info!(
        customer_id = %customer.id,
        auth_identity_id = %identity.id,
        "Customer created"
    );

    Ok(Json(CustomerResponse { customer }))
}

/// Log a customer in with email and password
#[utoipa::path(
    post,
    path = "/store/customers/login",
    request_body = CustomerLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Email or password missing", body = ErrorResponse),
        (status = 401, description = "Invalid credentials or unverified email", body = ErrorResponse)
    ),
    tag = "Store"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CustomerLoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = state
        .login
        .login(req.email.as_deref(), req.password.as_deref())
        .await?;
    Ok(Json(TokenResponse { token }))
}

/// Send an email verification link
///
/// Answers the same way whether or not an account exists for the address.
#[utoipa::path(
    post,
    path = "/store/customers/send-verification",
    request_body = SendVerificationRequest,
    responses(
        (status = 200, description = "Verification email dispatched", body = SuccessResponse),
        (status = 400, description = "No email given or derivable", body = ErrorResponse)
    ),
    tag = "Store"
)]
pub async fn send_verification(
    State(state): State<AppState>,
    OptionalAuthContext(claims): OptionalAuthContext,
    JsonBody(body): JsonBody,
) -> Result<Json<SuccessResponse>, AppError> {
    let req: SendVerificationRequest = serde_json::from_value(body)
        .map_err(|e| AppError::invalid_data(format!("Invalid request body: {}", e)))?;

    let email = match req.email.filter(|e| !e.trim().is_empty()) {
        Some(email) => email,
        None => email_from_identity(&state, claims.as_ref())
            .await
            .unwrap_or_default(),
    };

    state.verification.send_verification(&email).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// The emailpass address of the caller's identity, if any.
async fn email_from_identity(state: &AppState, claims: Option<&AppTokenClaims>) -> Option<String> {
    let claims = claims?;
    match state.auth.retrieve(&claims.auth_identity_id).await {
        Ok(identity) => identity
            .and_then(|i| i.provider_identity(EMAILPASS_PROVIDER).map(|p| p.entity_id.clone())),
        Err(e) => {
            tracing::warn!(error = %e, "Identity lookup failed while resolving caller email");
            None
        }
    }
}

/// Redeem an email verification token
#[utoipa::path(
    post,
    path = "/store/customers/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = SuccessResponse),
        (status = 400, description = "Token missing", body = ErrorResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse)
    ),
    tag = "Store"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyEmailRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .verification
        .verify_email(req.token.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(SuccessResponse::ok()))
}
