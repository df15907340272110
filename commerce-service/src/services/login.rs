use serde_json::{json, Value};
use std::sync::Arc;

use super::auth::{AuthModule, AuthOutcome, AuthRequest};
use super::error::{RepositoryError, ServiceError};
use super::metrics;
use super::repository::CustomerRepository;
use super::tokens::{ActorType, TokenService};
use super::verification::{MissingCustomer, VerificationService, VERIFY_EMAIL_MESSAGE};
use crate::models::{
    AuthIdentity, Customer, Metadata, NewCustomer, VerificationStatus, CUSTOMER_ID_KEY,
    EMAILPASS_PROVIDER,
};
use crate::utils::EmailCandidates;

/// What a successful authentication hands back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Token(String),
    /// The provider wants the client to continue at this location.
    Location(String),
}

/// Customer login flows: the generic provider route and the direct emailpass login.
#[derive(Clone)]
pub struct LoginService {
    customers: Arc<dyn CustomerRepository>,
    auth: AuthModule,
    tokens: TokenService,
    verification: VerificationService,
    allow_customer_backfill: bool,
}

impl LoginService {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        auth: AuthModule,
        tokens: TokenService,
        verification: VerificationService,
        allow_customer_backfill: bool,
    ) -> Self {
        Self {
            customers,
            auth,
            tokens,
            verification,
            allow_customer_backfill,
        }
    }

    fn gates_customer_emailpass(actor_type: &str, provider: &str) -> bool {
        actor_type == ActorType::Customer.as_str() && provider == EMAILPASS_PROVIDER
    }

    /// Generic `/auth/:actor_type/:auth_provider` flow.
    ///
    /// Customer emailpass logins are checked twice: once against the email
    /// the client sent, and again against the email of the identity that
    /// actually authenticated.
    pub async fn authenticate_actor(
        &self,
        actor_type: &str,
        provider: &str,
        request: &AuthRequest,
    ) -> Result<AuthResult, ServiceError> {
        let gated = Self::gates_customer_emailpass(actor_type, provider);

        if gated {
            if let Some(email) = request.field("email") {
                self.verification
                    .enforce(email, MissingCustomer::Block)
                    .await?;
            }
        }

        let identity = match self.auth.authenticate(provider, request).await? {
            AuthOutcome::Redirect { location } => return Ok(AuthResult::Location(location)),
            AuthOutcome::Failed(message) => {
                tracing::info!(actor_type, provider, "Authentication failed");
                return Err(ServiceError::unauthorized(failure_message(message)));
            }
            AuthOutcome::Authenticated(identity) => identity,
        };

        if gated {
            self.verification
                .enforce_for_identity(&identity, provider)
                .await?;
        }

        let token = self.tokens.issue_app_token(&identity, actor_type, provider)?;
        tracing::info!(
            auth_identity_id = %identity.id,
            actor_type,
            provider,
            "Actor authenticated"
        );
        Ok(AuthResult::Token(token))
    }

    /// Direct emailpass login for customers.
    ///
    /// Reconciles the customer record with the auth identity before the
    /// password is checked, and refuses unverified accounts without ever
    /// consulting the provider.
    pub async fn login(
        &self,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<String, ServiceError> {
        let (Some(candidates), Some(password)) = (
            email.and_then(EmailCandidates::new),
            password.filter(|p| !p.is_empty()),
        ) else {
            return Err(ServiceError::invalid_data("Email and password are required."));
        };

        let mut customer = self.customers.find_by_emails(candidates.as_slice()).await?;

        let mut identity = match self
            .auth
            .find_identity_by_emails(EMAILPASS_PROVIDER, candidates.as_slice())
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "Identity lookup failed during login");
                None
            }
        };

        let relinked = match (&customer, &identity) {
            (Some(c), Some(i)) if i.customer_id() != Some(c.id.as_str()) => {
                Some(self.relink(i, c).await)
            }
            _ => None,
        };
        if relinked.is_some() {
            identity = relinked;
        }

        let customer_status = customer.as_ref().map(Customer::verification);
        let identity_status = identity.as_ref().map(AuthIdentity::verification);

        if customer.is_none() {
            if let Some(identity) = &identity {
                customer = self.backfill_customer(candidates.normalized(), identity).await?;
            }
        }

        let status = VerificationService::combined_status(customer_status, identity_status);
        if status.blocks_login() {
            tracing::info!(
                customer_id = ?customer.as_ref().map(|c| c.id.as_str()),
                "Login blocked until email is verified"
            );
            metrics::record_login_blocked("login");
            return Err(ServiceError::unauthorized(VERIFY_EMAIL_MESSAGE));
        }

        let request = AuthRequest::from_body(json!({
            "email": candidates.normalized(),
            "password": password,
        }));

        match self.auth.authenticate(EMAILPASS_PROVIDER, &request).await? {
            AuthOutcome::Authenticated(identity) => {
                let token = self.tokens.issue_app_token(
                    &identity,
                    ActorType::Customer.as_str(),
                    EMAILPASS_PROVIDER,
                )?;
                tracing::info!(auth_identity_id = %identity.id, "Customer logged in");
                Ok(token)
            }
            AuthOutcome::Redirect { location } => {
                tracing::warn!(location = %location, "Emailpass login answered with a redirect");
                Err(ServiceError::unauthorized("Authentication failed"))
            }
            AuthOutcome::Failed(message) => {
                Err(ServiceError::unauthorized(failure_message(message)))
            }
        }
    }

    /// Points the identity at `customer`. Best effort: on failure the stale
    /// identity is kept and the login carries on.
    async fn relink(&self, identity: &AuthIdentity, customer: &Customer) -> AuthIdentity {
        let mut patch = Metadata::new();
        patch.insert(CUSTOMER_ID_KEY.to_string(), Value::String(customer.id.clone()));

        match self.auth.update_app_metadata(&identity.id, patch).await {
            Ok(updated) => {
                tracing::info!(
                    auth_identity_id = %identity.id,
                    customer_id = %customer.id,
                    "Relinked auth identity to customer"
                );
                updated
            }
            Err(e) => {
                tracing::warn!(
                    auth_identity_id = %identity.id,
                    error = %e,
                    "Failed to relink auth identity to customer"
                );
                identity.clone()
            }
        }
    }

    /// Creates the customer an existing identity is missing, seeded with the
    /// identity's verification state. Losing a creation race re-reads the
    /// winner's record.
    async fn backfill_customer(
        &self,
        email: &str,
        identity: &AuthIdentity,
    ) -> Result<Option<Customer>, ServiceError> {
        if !self.allow_customer_backfill {
            tracing::info!(auth_identity_id = %identity.id, "Customer backfill disabled");
            return Ok(None);
        }

        let seed = VerificationStatus::from_metadata(&identity.app_metadata).seed_metadata();
        let created = self
            .customers
            .create(NewCustomer {
                email: email.to_string(),
                metadata: seed,
                ..Default::default()
            })
            .await;

        let customer = match created {
            Ok(customer) => customer,
            Err(RepositoryError::Conflict(_)) => {
                tracing::info!("Customer created concurrently, re-reading");
                match self.customers.find_by_email(email).await? {
                    Some(customer) => customer,
                    None => return Err(RepositoryError::NotFound(format!(
                        "Customer with email {} vanished after conflict",
                        email
                    ))
                    .into()),
                }
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            customer_id = %customer.id,
            auth_identity_id = %identity.id,
            "Backfilled customer for auth identity"
        );

        if identity.customer_id().is_none() {
            let _ = self.relink(identity, &customer).await;
        }

        Ok(Some(customer))
    }
}

fn failure_message(message: String) -> String {
    if message.trim().is_empty() {
        "Authentication failed".to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::services::email::MockEmailProvider;
    use crate::services::memory::MemoryStore;
    use crate::services::notifications::NotificationService;
    use crate::services::repository::testing::{Lookup, StubCustomers};
    use crate::services::repository::AuthIdentityRepository;
    use secrecy::SecretString;

    struct Fixture {
        store: Arc<MemoryStore>,
        auth: AuthModule,
        tokens: TokenService,
        login: LoginService,
    }

    fn fixture(allow_customer_backfill: bool) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        fixture_with(store.clone(), store, allow_customer_backfill)
    }

    fn fixture_with(
        store: Arc<MemoryStore>,
        customers: Arc<dyn CustomerRepository>,
        allow_customer_backfill: bool,
    ) -> Fixture {
        let tokens = TokenService::new(&JwtConfig {
            secret: SecretString::new("test-secret".into()),
            expires_in_seconds: 3600,
            issuer: None,
        })
        .unwrap();
        let auth = AuthModule::new(store.clone());
        let notifications =
            NotificationService::new(store.clone(), Arc::new(MockEmailProvider::new()));
        let verification = VerificationService::new(
            customers.clone(),
            auth.clone(),
            tokens.clone(),
            notifications,
            "https://shop.example.com".into(),
        );
        let login = LoginService::new(
            customers,
            auth.clone(),
            tokens.clone(),
            verification,
            allow_customer_backfill,
        );
        Fixture {
            store,
            auth,
            tokens,
            login,
        }
    }

    async fn register(f: &Fixture, email: &str, app_metadata: Value) -> AuthIdentity {
        let outcome = f
            .auth
            .register(
                EMAILPASS_PROVIDER,
                &AuthRequest::from_body(json!({ "email": email, "password": "supersecret" })),
            )
            .await
            .unwrap();
        let AuthOutcome::Authenticated(identity) = outcome else {
            panic!("registration failed");
        };
        let patch = app_metadata.as_object().cloned().unwrap_or_default();
        f.auth.update_app_metadata(&identity.id, patch).await.unwrap()
    }

    #[tokio::test]
    async fn missing_credentials_are_invalid() {
        let f = fixture(true);
        assert!(matches!(
            f.login.login(Some("a@b.com"), None).await,
            Err(ServiceError::InvalidData(_))
        ));
        assert!(matches!(
            f.login.login(Some("  "), Some("pw")).await,
            Err(ServiceError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn unverified_identity_is_blocked_and_customer_backfilled() {
        let f = fixture(true);
        let identity = register(&f, "a@b.com", json!({})).await;

        let err = f
            .login
            .login(Some("a@b.com"), Some("supersecret"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(msg) if msg == VERIFY_EMAIL_MESSAGE));

        let customer = f.store.find_by_email("a@b.com").await.unwrap().unwrap();
        assert!(customer.verification().blocks_login());
        let identity = AuthIdentityRepository::find_by_id(f.store.as_ref(), &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.customer_id(), Some(customer.id.as_str()));
    }

    #[tokio::test]
    async fn backfill_can_be_disabled() {
        let f = fixture(false);
        register(&f, "a@b.com", json!({ "email_verified": true })).await;

        let token = f.login.login(Some("a@b.com"), Some("supersecret")).await.unwrap();
        assert!(!token.is_empty());
        assert!(f.store.find_by_email("a@b.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn verified_identity_logs_in_with_customer_actor_id() {
        let f = fixture(true);
        register(&f, "TestUser@example.com", json!({ "email_verified": true })).await;

        let token = f
            .login
            .login(Some("testuser@example.com"), Some("supersecret"))
            .await
            .unwrap();
        let claims = f.tokens.validate_app_token(&token).unwrap();
        let customer = f
            .store
            .find_by_email("testuser@example.com")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(claims.actor_type, "customer");
        assert_eq!(claims.actor_id, customer.id);
    }

    #[tokio::test]
    async fn either_record_verified_is_enough() {
        let f = fixture(true);
        register(&f, "a@b.com", json!({})).await;
        CustomerRepository::create(
            f.store.as_ref(),
            NewCustomer {
                email: "a@b.com".into(),
                metadata: json!({ "email_verified": true, "email_verification_required": true })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(f.login.login(Some("a@b.com"), Some("supersecret")).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let f = fixture(true);
        register(&f, "a@b.com", json!({ "email_verified": true })).await;

        let err = f
            .login
            .login(Some("a@b.com"), Some("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(msg) if msg == "Invalid email or password"));
    }

    #[tokio::test]
    async fn generic_route_blocks_missing_customer() {
        let f = fixture(true);
        register(&f, "a@b.com", json!({ "email_verified": true })).await;

        let request =
            AuthRequest::from_body(json!({ "email": "a@b.com", "password": "supersecret" }));
        let err = f
            .login
            .authenticate_actor("customer", EMAILPASS_PROVIDER, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(msg) if msg == VERIFY_EMAIL_MESSAGE));
    }

    #[tokio::test]
    async fn generic_route_is_ungated_for_other_actors() {
        let f = fixture(true);
        register(&f, "admin@b.com", json!({})).await;

        let request =
            AuthRequest::from_body(json!({ "email": "admin@b.com", "password": "supersecret" }));
        let result = f
            .login
            .authenticate_actor("user", EMAILPASS_PROVIDER, &request)
            .await
            .unwrap();
        assert!(matches!(result, AuthResult::Token(_)));
    }

    #[tokio::test]
    async fn customer_lookup_failure_blocks_provider_login() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture_with(store.clone(), StubCustomers::new(store, Lookup::Fail), true);
        register(&f, "a@b.com", json!({ "email_verified": true })).await;

        let request =
            AuthRequest::from_body(json!({ "email": "a@b.com", "password": "supersecret" }));
        let err = f
            .login
            .authenticate_actor("customer", EMAILPASS_PROVIDER, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(msg) if msg == VERIFY_EMAIL_MESSAGE));
    }

    #[tokio::test]
    async fn backfill_conflict_relinks_existing_customer() {
        let store = Arc::new(MemoryStore::new());
        let existing = CustomerRepository::create(
            store.as_ref(),
            NewCustomer {
                email: "a@b.com".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let f = fixture_with(store.clone(), StubCustomers::new(store, Lookup::Miss), true);
        let identity = register(&f, "a@b.com", json!({ "email_verified": true })).await;
        assert_eq!(identity.customer_id(), None);

        let token = f.login.login(Some("a@b.com"), Some("supersecret")).await.unwrap();

        let identity = AuthIdentityRepository::find_by_id(f.store.as_ref(), &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.customer_id(), Some(existing.id.as_str()));
        let claims = f.tokens.validate_app_token(&token).unwrap();
        assert_eq!(claims.actor_id, existing.id);
    }
}
