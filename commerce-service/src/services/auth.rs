use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::{RepositoryError, ServiceError};
use super::repository::AuthIdentityRepository;
use crate::models::{
    auth_identity::PASSWORD_HASH_KEY, verification, AuthIdentity, Metadata, ProviderIdentity,
    EMAILPASS_PROVIDER,
};
use crate::utils::password::{hash_password_blocking, verify_password_blocking};
use crate::utils::{normalize_email, validation::string_field, Password, PasswordHashString};

/// Provider input: the JSON body and query string of the auth request.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub body: Value,
    pub query: HashMap<String, String>,
}

impl AuthRequest {
    pub fn from_body(body: Value) -> Self {
        Self {
            body,
            query: HashMap::new(),
        }
    }

    /// Field from the body, falling back to the query string.
    pub fn field(&self, key: &str) -> Option<&str> {
        string_field(&self.body, key).or_else(|| {
            self.query
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        })
    }
}

#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// The provider needs the client to continue elsewhere (e.g. OAuth).
    Redirect { location: String },
    Authenticated(AuthIdentity),
    Failed(String),
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthOutcome, ServiceError>;

    async fn register(&self, request: &AuthRequest) -> Result<AuthOutcome, ServiceError>;

    /// Replace the credentials of the identity owning `entity_id`.
    async fn update(
        &self,
        entity_id: &str,
        request: &AuthRequest,
    ) -> Result<AuthOutcome, ServiceError>;
}

/// Email and password provider storing argon2 hashes in provider metadata.
pub struct EmailPassProvider {
    identities: Arc<dyn AuthIdentityRepository>,
}

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const MISSING_CREDENTIALS: &str = "Email and password are required";
const IDENTITY_EXISTS: &str = "Identity with email already exists";

impl EmailPassProvider {
    pub fn new(identities: Arc<dyn AuthIdentityRepository>) -> Self {
        Self { identities }
    }

    fn credentials(request: &AuthRequest) -> Option<(String, Password)> {
        let email = request.field("email")?;
        let password = request
            .body
            .get("password")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())?;
        Some((normalize_email(email), Password::new(password)))
    }
}

#[async_trait]
impl AuthProvider for EmailPassProvider {
    fn name(&self) -> &'static str {
        EMAILPASS_PROVIDER
    }

    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthOutcome, ServiceError> {
        let Some((email, password)) = Self::credentials(request) else {
            return Ok(AuthOutcome::Failed(MISSING_CREDENTIALS.to_string()));
        };

        let Some(identity) = self
            .identities
            .find_by_provider_entity(EMAILPASS_PROVIDER, &email)
            .await?
        else {
            tracing::info!("Authentication failed: unknown identity");
            return Ok(AuthOutcome::Failed(INVALID_CREDENTIALS.to_string()));
        };

        let Some(hash) = identity
            .provider_identity(EMAILPASS_PROVIDER)
            .and_then(|p| p.password_hash())
            .map(|h| PasswordHashString::new(h.to_string()))
        else {
            tracing::warn!(auth_identity_id = %identity.id, "Identity has no password hash");
            return Ok(AuthOutcome::Failed(INVALID_CREDENTIALS.to_string()));
        };

        if verify_password_blocking(password, hash).await? {
            Ok(AuthOutcome::Authenticated(identity))
        } else {
            tracing::info!(auth_identity_id = %identity.id, "Authentication failed: wrong password");
            Ok(AuthOutcome::Failed(INVALID_CREDENTIALS.to_string()))
        }
    }

    async fn register(&self, request: &AuthRequest) -> Result<AuthOutcome, ServiceError> {
        let Some((email, password)) = Self::credentials(request) else {
            return Ok(AuthOutcome::Failed(MISSING_CREDENTIALS.to_string()));
        };

        if self
            .identities
            .find_by_provider_entity(EMAILPASS_PROVIDER, &email)
            .await?
            .is_some()
        {
            return Ok(AuthOutcome::Failed(IDENTITY_EXISTS.to_string()));
        }

        let hash = hash_password_blocking(password).await?;
        let mut provider_identity = ProviderIdentity::new(EMAILPASS_PROVIDER, email);
        provider_identity
            .provider_metadata
            .insert(PASSWORD_HASH_KEY.to_string(), json!(hash.into_string()));

        let identity = AuthIdentity::new(provider_identity, verification::with_defaults(Metadata::new()));

        match self.identities.create(identity).await {
            Ok(identity) => {
                tracing::info!(auth_identity_id = %identity.id, "Registered emailpass identity");
                Ok(AuthOutcome::Authenticated(identity))
            }
            Err(RepositoryError::Conflict(_)) => Ok(AuthOutcome::Failed(IDENTITY_EXISTS.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        entity_id: &str,
        request: &AuthRequest,
    ) -> Result<AuthOutcome, ServiceError> {
        let Some(password) = request
            .body
            .get("password")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
        else {
            return Ok(AuthOutcome::Failed("Password is required".to_string()));
        };

        let Some(identity) = self
            .identities
            .find_by_provider_entity(EMAILPASS_PROVIDER, &normalize_email(entity_id))
            .await?
        else {
            return Ok(AuthOutcome::Failed(INVALID_CREDENTIALS.to_string()));
        };

        let hash = hash_password_blocking(Password::new(password)).await?;
        let mut patch = Metadata::new();
        patch.insert(PASSWORD_HASH_KEY.to_string(), json!(hash.into_string()));

        let identity = self
            .identities
            .update_provider_metadata(&identity.id, EMAILPASS_PROVIDER, patch)
            .await?;
        tracing::info!(auth_identity_id = %identity.id, "Password updated");
        Ok(AuthOutcome::Authenticated(identity))
    }
}

/// Provider registry plus access to the identity store.
#[derive(Clone)]
pub struct AuthModule {
    identities: Arc<dyn AuthIdentityRepository>,
    providers: Arc<HashMap<&'static str, Arc<dyn AuthProvider>>>,
}

impl AuthModule {
    /// Module with the `emailpass` provider registered.
    pub fn new(identities: Arc<dyn AuthIdentityRepository>) -> Self {
        let emailpass: Arc<dyn AuthProvider> = Arc::new(EmailPassProvider::new(identities.clone()));
        Self::with_providers(identities, vec![emailpass])
    }

    pub fn with_providers(
        identities: Arc<dyn AuthIdentityRepository>,
        providers: Vec<Arc<dyn AuthProvider>>,
    ) -> Self {
        let providers: HashMap<&'static str, Arc<dyn AuthProvider>> =
            providers.into_iter().map(|p| (p.name(), p)).collect();
        Self {
            identities,
            providers: Arc::new(providers),
        }
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn AuthProvider>, AuthOutcome> {
        self.providers.get(name).ok_or_else(|| {
            AuthOutcome::Failed(format!(
                "Unable to retrieve the auth provider with id: {}",
                name
            ))
        })
    }

    pub async fn authenticate(
        &self,
        provider: &str,
        request: &AuthRequest,
    ) -> Result<AuthOutcome, ServiceError> {
        match self.provider(provider) {
            Ok(p) => p.authenticate(request).await,
            Err(outcome) => Ok(outcome),
        }
    }

    pub async fn register(
        &self,
        provider: &str,
        request: &AuthRequest,
    ) -> Result<AuthOutcome, ServiceError> {
        match self.provider(provider) {
            Ok(p) => p.register(request).await,
            Err(outcome) => Ok(outcome),
        }
    }

    pub async fn update_provider(
        &self,
        provider: &str,
        entity_id: &str,
        request: &AuthRequest,
    ) -> Result<AuthOutcome, ServiceError> {
        match self.provider(provider) {
            Ok(p) => p.update(entity_id, request).await,
            Err(outcome) => Ok(outcome),
        }
    }

    pub async fn retrieve(&self, id: &str) -> Result<Option<AuthIdentity>, ServiceError> {
        Ok(self.identities.find_by_id(id).await?)
    }

    pub async fn find_identity(
        &self,
        provider: &str,
        entity_id: &str,
    ) -> Result<Option<AuthIdentity>, ServiceError> {
        Ok(self
            .identities
            .find_by_provider_entity(provider, entity_id)
            .await?)
    }

    /// First identity matching any of `emails`, tried in order.
    pub async fn find_identity_by_emails(
        &self,
        provider: &str,
        emails: &[String],
    ) -> Result<Option<AuthIdentity>, ServiceError> {
        for email in emails {
            if let Some(identity) = self.find_identity(provider, email).await? {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }

    pub async fn update_app_metadata(
        &self,
        id: &str,
        patch: Metadata,
    ) -> Result<AuthIdentity, ServiceError> {
        Ok(self.identities.update_app_metadata(id, patch).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryStore;

    fn module() -> AuthModule {
        AuthModule::new(Arc::new(MemoryStore::new()))
    }

    fn credentials(email: &str, password: &str) -> AuthRequest {
        AuthRequest::from_body(json!({ "email": email, "password": password }))
    }

    #[tokio::test]
    async fn register_then_authenticate_case_insensitively() {
        let auth = module();
        let registered = auth
            .register(EMAILPASS_PROVIDER, &credentials("TestUser@example.com", "supersecret"))
            .await
            .unwrap();
        let AuthOutcome::Authenticated(identity) = registered else {
            panic!("registration should succeed");
        };
        assert_eq!(
            identity.provider_identity(EMAILPASS_PROVIDER).map(|p| p.entity_id.as_str()),
            Some("testuser@example.com")
        );
        assert!(identity.verification().blocks_login());

        let outcome = auth
            .authenticate(EMAILPASS_PROVIDER, &credentials("testuser@example.com", "supersecret"))
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Authenticated(i) if i.id == identity.id));
    }

    #[tokio::test]
    async fn wrong_password_fails() {
        let auth = module();
        auth.register(EMAILPASS_PROVIDER, &credentials("a@b.com", "supersecret"))
            .await
            .unwrap();
        let outcome = auth
            .authenticate(EMAILPASS_PROVIDER, &credentials("a@b.com", "nope"))
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Failed(msg) if msg == INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let auth = module();
        auth.register(EMAILPASS_PROVIDER, &credentials("a@b.com", "supersecret"))
            .await
            .unwrap();
        let outcome = auth
            .register(EMAILPASS_PROVIDER, &credentials("A@B.com", "other"))
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Failed(msg) if msg == IDENTITY_EXISTS));
    }

    #[tokio::test]
    async fn unknown_provider_fails_without_error() {
        let outcome = module()
            .authenticate("google", &AuthRequest::default())
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Failed(msg) if msg.contains("google")));
    }

    #[tokio::test]
    async fn update_replaces_password() {
        let auth = module();
        auth.register(EMAILPASS_PROVIDER, &credentials("a@b.com", "supersecret"))
            .await
            .unwrap();
        let outcome = auth
            .update_provider(
                EMAILPASS_PROVIDER,
                "a@b.com",
                &AuthRequest::from_body(json!({ "password": "newsecret" })),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Authenticated(_)));

        let old = auth
            .authenticate(EMAILPASS_PROVIDER, &credentials("a@b.com", "supersecret"))
            .await
            .unwrap();
        assert!(matches!(old, AuthOutcome::Failed(_)));
        let new = auth
            .authenticate(EMAILPASS_PROVIDER, &credentials("a@b.com", "newsecret"))
            .await
            .unwrap();
        assert!(matches!(new, AuthOutcome::Authenticated(_)));
    }
}
