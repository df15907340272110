use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Customer, Metadata};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "customer@example.com")]
    pub email: String,
    #[schema(example = "Ada")]
    pub first_name: Option<String>,
    #[schema(example = "Lovelace")]
    pub last_name: Option<String>,
    pub phone: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerResponse {
    pub customer: Customer,
}

/// Both fields are optional so a missing one is reported as invalid data
/// rather than a deserialization failure.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CustomerLoginRequest {
    #[schema(example = "customer@example.com")]
    pub email: Option<String>,
    #[schema(example = "supersecret")]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct SendVerificationRequest {
    #[schema(example = "customer@example.com")]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyEmailRequest {
    pub token: Option<String>,
}
