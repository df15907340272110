use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

use super::auth::AuthModule;
use super::error::ServiceError;
use super::metrics;
use super::notifications::NotificationService;
use super::repository::CustomerRepository;
use super::tokens::{ActorType, TokenPurpose, TokenService};
use crate::models::{
    verification, AuthIdentity, CreateNotification, NotificationTemplate, VerificationStatus,
    EMAILPASS_PROVIDER,
};
use crate::utils::{normalize_email, EmailCandidates};

pub const VERIFY_EMAIL_MESSAGE: &str = "Please verify your email before signing in.";
pub const MISSING_ACCOUNT_EMAIL_MESSAGE: &str =
    "Email is missing on the account. Please verify your email before signing in.";
pub const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;

/// How a gate treats an email with no customer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingCustomer {
    /// Let the request through; a later check decides.
    Allow,
    /// Treat the address as unverified.
    Block,
}

/// Email verification workflow: login gates, link issuance and redemption.
#[derive(Clone)]
pub struct VerificationService {
    customers: Arc<dyn CustomerRepository>,
    auth: AuthModule,
    tokens: TokenService,
    notifications: NotificationService,
    storefront_url: String,
}

impl VerificationService {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        auth: AuthModule,
        tokens: TokenService,
        notifications: NotificationService,
        storefront_url: String,
    ) -> Self {
        Self {
            customers,
            auth,
            tokens,
            notifications,
            storefront_url,
        }
    }

    /// Rejects the login when the customer behind `email` still has to verify.
    ///
    /// Lookup failures block the login with the same message.
    pub async fn enforce(&self, email: &str, missing: MissingCustomer) -> Result<(), ServiceError> {
        let email = normalize_email(email);

        let customer = match self.customers.find_by_email(&email).await {
            Ok(customer) => customer,
            Err(e) => {
                tracing::error!(error = %e, "Customer lookup failed during verification check");
                metrics::record_login_blocked("lookup_failed");
                return Err(ServiceError::unauthorized(VERIFY_EMAIL_MESSAGE));
            }
        };

        let blocked = match (&customer, missing) {
            (Some(customer), _) => customer.verification().blocks_login(),
            (None, MissingCustomer::Allow) => false,
            (None, MissingCustomer::Block) => true,
        };

        if blocked {
            tracing::info!(
                customer_id = ?customer.as_ref().map(|c| c.id.as_str()),
                "Blocking login for unverified email"
            );
            metrics::record_login_blocked("gate");
            return Err(ServiceError::unauthorized(VERIFY_EMAIL_MESSAGE));
        }

        Ok(())
    }

    /// Post-authentication check keyed on the identity's own email, not on
    /// anything the client sent.
    pub async fn enforce_for_identity(
        &self,
        identity: &AuthIdentity,
        provider: &str,
    ) -> Result<(), ServiceError> {
        let Some(email) = identity
            .provider_identity(provider)
            .map(|p| p.entity_id.trim())
            .filter(|e| !e.is_empty())
        else {
            tracing::warn!(auth_identity_id = %identity.id, "Authenticated identity has no email");
            return Err(ServiceError::unauthorized(MISSING_ACCOUNT_EMAIL_MESSAGE));
        };

        self.enforce(email, MissingCustomer::Block).await
    }

    /// Issues a verification link and mails it. Succeeds whether or not an
    /// account exists for the address.
    pub async fn send_verification(&self, raw_email: &str) -> Result<(), ServiceError> {
        let candidates = EmailCandidates::new(raw_email).ok_or_else(|| {
            ServiceError::invalid_data("Email is required to send a verification link.")
        })?;
        let email = candidates.normalized();

        self.mark_pending(&candidates).await;

        let token = self.tokens.issue_action_token(
            email,
            EMAILPASS_PROVIDER,
            ActorType::Customer,
            TokenPurpose::EmailVerification,
            Duration::hours(VERIFICATION_TOKEN_TTL_HOURS),
        )?;

        let verify_url = format!(
            "{}/verify-email?token={}&email={}",
            self.storefront_url,
            token,
            urlencoding::encode(email)
        );

        self.notifications
            .create_notification(CreateNotification::email(
                email,
                NotificationTemplate::EmailVerification,
                json!({ "verify_url": verify_url, "email": email }),
            ))
            .await?;

        metrics::record_verification_email_sent();
        tracing::info!("Verification email dispatched");
        Ok(())
    }

    /// Best effort; failures are logged and never surface to the caller.
    async fn mark_pending(&self, candidates: &EmailCandidates) {
        let identity = match self
            .auth
            .find_identity_by_emails(EMAILPASS_PROVIDER, candidates.as_slice())
            .await
        {
            Ok(Some(identity)) => identity,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Identity lookup failed while sending verification");
                return;
            }
        };

        if let Err(e) = self
            .auth
            .update_app_metadata(&identity.id, verification::pending_patch(&identity.app_metadata))
            .await
        {
            tracing::warn!(
                auth_identity_id = %identity.id,
                error = %e,
                "Failed to mark identity as pending verification"
            );
        }
    }

    /// Redeems a verification token, marking both the identity and the
    /// customer as verified. Redeeming again changes nothing.
    pub async fn verify_email(&self, token: &str) -> Result<(), ServiceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ServiceError::invalid_data("Verification token is required."));
        }

        let claims = self
            .tokens
            .validate_action_token(token, TokenPurpose::EmailVerification, ActorType::Customer)
            .map_err(|e| match e {
                ServiceError::TokenPurposeMismatch => {
                    ServiceError::unauthorized("Invalid verification token.")
                }
                _ => ServiceError::unauthorized("Invalid or expired verification link."),
            })?;

        let raw_email = claims.email.as_deref().unwrap_or(&claims.entity_id);
        let candidates = EmailCandidates::new(raw_email).ok_or_else(|| {
            ServiceError::invalid_data("Verification token is missing the account email.")
        })?;

        let now = Utc::now();

        match self
            .auth
            .find_identity_by_emails(EMAILPASS_PROVIDER, candidates.as_slice())
            .await
        {
            Ok(Some(identity)) => {
                let patch = verification::verified_patch(Some(&identity.app_metadata), now);
                self.auth.update_app_metadata(&identity.id, patch).await?;
                tracing::info!(auth_identity_id = %identity.id, "Auth identity verified");
            }
            Ok(None) => tracing::info!("No auth identity for verified email"),
            Err(e) => tracing::warn!(error = %e, "Identity lookup failed during verification"),
        }

        match self.customers.find_by_emails(candidates.as_slice()).await? {
            Some(customer) => {
                let patch = verification::verified_patch(Some(&customer.metadata), now);
                self.customers.update_metadata(&customer.id, patch).await?;
                tracing::info!(customer_id = %customer.id, "Customer verified");
            }
            None => {
                let updated = self
                    .customers
                    .update_metadata_by_emails(
                        candidates.as_slice(),
                        verification::verified_patch(None, now),
                    )
                    .await?;
                tracing::info!(updated, "Customer verified by email selector");
            }
        }

        metrics::record_email_verified();
        Ok(())
    }

    /// Combined status used by the login route.
    pub fn combined_status(
        customer: Option<VerificationStatus>,
        identity: Option<VerificationStatus>,
    ) -> VerificationStatus {
        VerificationStatus::combine(
            customer.unwrap_or(VerificationStatus::UNKNOWN),
            identity.unwrap_or(VerificationStatus::UNKNOWN),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::models::{Metadata, NewCustomer};
    use crate::services::auth::AuthRequest;
    use crate::services::email::MockEmailProvider;
    use crate::services::memory::MemoryStore;
    use crate::services::repository::testing::{Lookup, StubCustomers};
    use secrecy::SecretString;

    struct Fixture {
        store: Arc<MemoryStore>,
        email: Arc<MockEmailProvider>,
        tokens: TokenService,
        service: VerificationService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        fixture_with(store.clone(), store)
    }

    fn fixture_with(store: Arc<MemoryStore>, customers: Arc<dyn CustomerRepository>) -> Fixture {
        let email = Arc::new(MockEmailProvider::new());
        let tokens = TokenService::new(&JwtConfig {
            secret: SecretString::new("test-secret".into()),
            expires_in_seconds: 3600,
            issuer: None,
        })
        .unwrap();
        let auth = AuthModule::new(store.clone());
        let notifications = NotificationService::new(store.clone(), email.clone());
        let service = VerificationService::new(
            customers,
            auth,
            tokens.clone(),
            notifications,
            "https://shop.example.com".to_string(),
        );
        Fixture {
            store,
            email,
            tokens,
            service,
        }
    }

    async fn customer(store: &MemoryStore, email: &str, metadata: serde_json::Value) {
        CustomerRepository::create(
            store,
            NewCustomer {
                email: email.to_string(),
                metadata: metadata.as_object().cloned().unwrap_or_default(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn gate_blocks_unverified_customer() {
        let f = fixture();
        customer(&f.store, "a@b.com", json!({ "email_verification_required": true })).await;

        let err = f
            .service
            .enforce(" A@B.com ", MissingCustomer::Allow)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(msg) if msg == VERIFY_EMAIL_MESSAGE));
    }

    #[tokio::test]
    async fn gate_policy_for_missing_customer() {
        let f = fixture();
        assert!(f
            .service
            .enforce("ghost@b.com", MissingCustomer::Allow)
            .await
            .is_ok());
        assert!(f
            .service
            .enforce("ghost@b.com", MissingCustomer::Block)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn waived_customer_passes() {
        let f = fixture();
        customer(&f.store, "a@b.com", json!({ "email_verification_required": false })).await;
        assert!(f.service.enforce("a@b.com", MissingCustomer::Block).await.is_ok());
    }

    #[tokio::test]
    async fn send_verification_mails_link_for_unknown_email() {
        let f = fixture();
        f.service.send_verification("Ghost@Example.com").await.unwrap();

        let sent = f.email.sent_to("ghost@example.com").await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0]
            .body_text
            .contains("https://shop.example.com/verify-email?token="));
        assert!(sent[0].body_text.contains("&email=ghost%40example.com"));
    }

    #[tokio::test]
    async fn send_verification_requires_email() {
        let f = fixture();
        let err = f.service.send_verification("  ").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidData(_)));
    }

    #[tokio::test]
    async fn send_verification_marks_identity_pending() {
        let f = fixture();
        let auth = AuthModule::new(f.store.clone());
        auth.register(
            EMAILPASS_PROVIDER,
            &AuthRequest::from_body(json!({ "email": "a@b.com", "password": "supersecret" })),
        )
        .await
        .unwrap();
        let identity = auth
            .find_identity(EMAILPASS_PROVIDER, "a@b.com")
            .await
            .unwrap()
            .unwrap();
        let mut waived = Metadata::new();
        waived.insert("email_verification_required".into(), json!(false));
        auth.update_app_metadata(&identity.id, waived).await.unwrap();

        f.service.send_verification("a@b.com").await.unwrap();

        let identity = auth
            .find_identity(EMAILPASS_PROVIDER, "a@b.com")
            .await
            .unwrap()
            .unwrap();
        assert!(identity.verification().blocks_login());
    }

    #[tokio::test]
    async fn verify_marks_customer_and_is_idempotent() {
        let f = fixture();
        customer(&f.store, "a@b.com", json!({ "email_verification_required": true })).await;
        let token = f
            .tokens
            .issue_action_token(
                "A@B.com",
                EMAILPASS_PROVIDER,
                ActorType::Customer,
                TokenPurpose::EmailVerification,
                Duration::hours(24),
            )
            .unwrap();

        f.service.verify_email(&token).await.unwrap();
        let first = f.store.find_by_email("a@b.com").await.unwrap().unwrap();
        assert!(!first.verification().blocks_login());
        assert!(first.metadata.get("email_verified_at").is_some());

        f.service.verify_email(&token).await.unwrap();
        let second = f.store.find_by_email("a@b.com").await.unwrap().unwrap();
        assert_eq!(second.metadata, first.metadata);
    }

    #[tokio::test]
    async fn verify_rejects_wrong_purpose_without_mutation() {
        let f = fixture();
        customer(&f.store, "a@b.com", json!({})).await;
        let token = f
            .tokens
            .issue_action_token(
                "a@b.com",
                EMAILPASS_PROVIDER,
                ActorType::Customer,
                TokenPurpose::PasswordReset,
                Duration::hours(1),
            )
            .unwrap();

        let err = f.service.verify_email(&token).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(msg) if msg == "Invalid verification token."));

        let customer = f.store.find_by_email("a@b.com").await.unwrap().unwrap();
        assert!(customer.verification().blocks_login());
    }

    #[tokio::test]
    async fn verify_rejects_blank_and_garbage_tokens() {
        let f = fixture();
        assert!(matches!(
            f.service.verify_email("").await,
            Err(ServiceError::InvalidData(_))
        ));
        assert!(matches!(
            f.service.verify_email("not-a-token").await,
            Err(ServiceError::Unauthorized(msg)) if msg == "Invalid or expired verification link."
        ));
    }

    #[tokio::test]
    async fn gate_fails_closed_when_lookup_errors() {
        let store = Arc::new(MemoryStore::new());
        customer(&store, "a@b.com", json!({ "email_verified": true })).await;
        let f = fixture_with(store.clone(), StubCustomers::new(store, Lookup::Fail));

        for missing in [MissingCustomer::Allow, MissingCustomer::Block] {
            let err = f.service.enforce("a@b.com", missing).await.unwrap_err();
            assert!(matches!(err, ServiceError::Unauthorized(msg) if msg == VERIFY_EMAIL_MESSAGE));
        }
    }

    #[tokio::test]
    async fn verify_falls_back_to_email_selector() {
        let store = Arc::new(MemoryStore::new());
        customer(&store, "a@b.com", json!({ "email_verification_required": true })).await;
        let f = fixture_with(store.clone(), StubCustomers::new(store, Lookup::Miss));
        let token = f
            .tokens
            .issue_action_token(
                "a@b.com",
                EMAILPASS_PROVIDER,
                ActorType::Customer,
                TokenPurpose::EmailVerification,
                Duration::hours(1),
            )
            .unwrap();

        f.service.verify_email(&token).await.unwrap();

        let customer = f.store.find_by_email("a@b.com").await.unwrap().unwrap();
        assert_eq!(customer.metadata["email_verified"], true);
        assert_eq!(customer.metadata["email_verification_required"], false);
        assert!(customer.metadata["email_verified_at"].is_string());
    }
}
