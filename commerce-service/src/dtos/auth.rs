use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Credentials understood by the `emailpass` provider.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailPassCredentials {
    #[schema(example = "customer@example.com")]
    pub email: String,
    #[schema(example = "supersecret")]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    #[schema(example = "eyJhbGciOiJIUzI1NiJ9...")]
    pub token: String,
}

/// Returned when the provider needs the client to continue elsewhere.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LocationResponse {
    #[schema(example = "https://accounts.example.com/authorize?client_id=...")]
    pub location: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Identifier is required"))]
    #[schema(example = "customer@example.com")]
    pub identifier: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePasswordRequest {
    #[schema(example = "newsecret")]
    pub password: String,
}
