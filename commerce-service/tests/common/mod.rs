#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use commerce_service::{
    build_router,
    config::{
        CommerceConfig, Environment, EventConfig, JwtConfig, LoginConfig, RateLimitConfig,
        SecurityConfig, SmtpConfig, StorageBackend, StorageConfig, UrlConfig,
    },
    models::{Customer, Notification},
    services::{CustomerRepository, MemoryStore, MockEmailProvider, Stores},
    AppState,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

pub const ADMIN_API_KEY: &str = "test-admin-key";
pub const STOREFRONT: &str = "http://localhost:8000";
pub const PASSWORD: &str = "supersecret";

pub fn test_config() -> CommerceConfig {
    CommerceConfig {
        common: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        environment: Environment::Dev,
        service_name: "commerce-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        jwt: JwtConfig {
            secret: SecretString::new("test-jwt-secret".to_string()),
            expires_in_seconds: 3600,
            issuer: None,
        },
        urls: UrlConfig {
            store_cors: vec![STOREFRONT.to_string()],
            storefront_url: None,
            admin_backend_url: "/".to_string(),
            admin_path: "/app".to_string(),
            admin_order_email: None,
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            mongodb_uri: String::new(),
            mongodb_database: String::new(),
        },
        smtp: SmtpConfig {
            enabled: false,
            host: "smtp.test.local".to_string(),
            port: 587,
            user: String::new(),
            password: SecretString::new(String::new()),
            from_email: "noreply@example.com".to_string(),
            from_name: "Test Store".to_string(),
        },
        security: SecurityConfig {
            admin_api_key: SecretString::new(ADMIN_API_KEY.to_string()),
        },
        events: EventConfig { queue_size: 64 },
        login: LoginConfig {
            allow_customer_backfill: true,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            verification_attempts: 1000,
            verification_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub email: Arc<MockEmailProvider>,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::spawn_with(test_config())
    }

    pub fn spawn_with(config: CommerceConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let email = Arc::new(MockEmailProvider::new());
        let (state, _dispatcher) =
            AppState::build(config, Stores::from_backend(store.clone()), email.clone())
                .expect("Failed to build app state");
        let router = build_router(state.clone());

        TestApp {
            router,
            state,
            store,
            email,
        }
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(body), &[]).await
    }

    pub async fn post_with_bearer(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let auth = format!("Bearer {}", token);
        self.request("POST", uri, Some(body), &[("authorization", auth.as_str())])
            .await
    }

    /// Registers emailpass credentials and returns the registration token.
    pub async fn register(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/customer/emailpass/register",
                json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "registration failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Registration plus customer creation, the way the storefront signs people up.
    pub async fn sign_up(&self, email: &str) -> Value {
        let token = self.register(email, PASSWORD).await;
        let (status, body) = self
            .post_with_bearer("/store/customers", &token, json!({ "email": email }))
            .await;
        assert_eq!(status, StatusCode::OK, "customer creation failed: {}", body);
        body["customer"].clone()
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/store/customers/login",
            json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn customer(&self, email: &str) -> Option<Customer> {
        self.store.find_by_email(email).await.unwrap()
    }

    /// Token from the latest verification email sent to `email`.
    pub async fn verification_token(&self, email: &str) -> String {
        let sent = self.email.sent_to(email).await;
        let message = sent
            .iter()
            .rev()
            .find(|m| m.subject == "Confirm your email")
            .expect("no verification email sent");
        token_from_link(&message.body_text, "/verify-email?token=")
    }

    /// Waits for the event dispatcher to deliver `count` emails to `to`.
    pub async fn wait_for_emails(&self, to: &str, count: usize) {
        for _ in 0..100 {
            if self.email.sent_to(to).await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {} email(s) to {}", count, to);
    }

    pub fn notifications_to(&self, to: &str) -> Vec<Notification> {
        self.store
            .notifications()
            .into_iter()
            .filter(|n| n.to == to)
            .collect()
    }
}

pub fn token_from_link(text: &str, marker: &str) -> String {
    let start = text.find(marker).expect("link not found") + marker.len();
    text[start..]
        .split(|c: char| c == '&' || c.is_whitespace())
        .next()
        .unwrap()
        .to_string()
}
