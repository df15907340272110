use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::ServiceError;
use crate::config::JwtConfig;
use crate::models::{AuthIdentity, Metadata, CUSTOMER_ID_KEY};

/// HS256 token issuer for application and single-purpose action tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expires_in: Duration,
    issuer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Customer,
    User,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Customer => "customer",
            ActorType::User => "user",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(ActorType::Customer),
            "user" => Ok(ActorType::User),
            other => Err(format!("Unknown actor type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

/// Claims of the bearer token handed out after login or registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppTokenClaims {
    /// Empty until the identity is linked to an actor.
    pub actor_id: String,
    pub actor_type: String,
    pub auth_identity_id: String,
    pub app_metadata: Metadata,
    pub user_metadata: Metadata,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Claims of a single-purpose token (email verification, password reset).
///
/// Every field is required, so a token from another issuer or of another
/// shape fails to decode instead of being read defensively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTokenClaims {
    pub entity_id: String,
    pub provider: String,
    pub actor_type: ActorType,
    pub purpose: TokenPurpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let secret = config.secret.expose_secret();
        if secret.is_empty() {
            anyhow::bail!("JWT secret must not be empty");
        }

        tracing::info!("Token service initialized with HS256 secret");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expires_in: Duration::seconds(config.expires_in_seconds),
            issuer: config.issuer.clone(),
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }

    /// Bearer token for `identity` acting as `actor_type`.
    ///
    /// `actor_id` comes from the identity's `<actor_type>_id` link and the user
    /// metadata from the provider entry that authenticated.
    pub fn issue_app_token(
        &self,
        identity: &AuthIdentity,
        actor_type: &str,
        provider: &str,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let actor_id = identity.actor_id(actor_type).unwrap_or_default().to_string();

        let mut app_metadata = Metadata::new();
        if let Some(customer_id) = identity.customer_id() {
            app_metadata.insert(CUSTOMER_ID_KEY.to_string(), customer_id.into());
        }

        let claims = AppTokenClaims {
            actor_id,
            actor_type: actor_type.to_string(),
            auth_identity_id: identity.id.clone(),
            app_metadata,
            user_metadata: identity
                .provider_identity(provider)
                .map(|p| p.user_metadata.clone())
                .unwrap_or_default(),
            iat: now.timestamp(),
            exp: (now + self.expires_in).timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    pub fn validate_app_token(&self, token: &str) -> Result<AppTokenClaims, ServiceError> {
        decode::<AppTokenClaims>(token, &self.decoding_key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "App token rejected");
                ServiceError::InvalidToken
            })
    }

    pub fn issue_action_token(
        &self,
        entity_id: &str,
        provider: &str,
        actor_type: ActorType,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = ActionTokenClaims {
            entity_id: entity_id.to_string(),
            provider: provider.to_string(),
            actor_type,
            purpose,
            email: None,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    /// Decodes an action token and checks it was minted for `purpose` and `actor_type`.
    ///
    /// Bad signatures, expiry and malformed claims are `InvalidToken`; a sound
    /// token minted for something else is `TokenPurposeMismatch`.
    pub fn validate_action_token(
        &self,
        token: &str,
        purpose: TokenPurpose,
        actor_type: ActorType,
    ) -> Result<ActionTokenClaims, ServiceError> {
        let claims = decode::<ActionTokenClaims>(token, &self.decoding_key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| {
                match e.kind() {
                    JwtErrorKind::ExpiredSignature => {
                        tracing::debug!("Action token expired")
                    }
                    _ => tracing::debug!(error = %e, "Action token rejected"),
                }
                ServiceError::InvalidToken
            })?;

        if claims.purpose != purpose || claims.actor_type != actor_type {
            tracing::warn!(
                purpose = ?claims.purpose,
                actor_type = %claims.actor_type,
                "Action token used for the wrong purpose"
            );
            return Err(ServiceError::TokenPurposeMismatch);
        }

        Ok(claims)
    }
}
