pub mod config;
pub mod dtos;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod subscribers;
pub mod utils;

use service_core::axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{CommerceConfig, Environment};
use crate::events::EventBus;
use crate::services::{
    AuthModule, EmailProvider, LoginService, NotificationService, Stores, TokenService,
    VerificationService,
};
use crate::subscribers::{build_registry, SubscriberContext};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::metrics::metrics,
        handlers::auth::authenticate,
        handlers::auth::register,
        handlers::auth::reset_password,
        handlers::auth::update_provider,
        handlers::customers::create_customer,
        handlers::customers::login,
        handlers::customers::send_verification,
        handlers::customers::verify_email,
        handlers::events::publish_event,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::SuccessResponse,
            dtos::auth::EmailPassCredentials,
            dtos::auth::TokenResponse,
            dtos::auth::LocationResponse,
            dtos::auth::ResetPasswordRequest,
            dtos::auth::UpdatePasswordRequest,
            dtos::customer::CreateCustomerRequest,
            dtos::customer::CustomerResponse,
            dtos::customer::CustomerLoginRequest,
            dtos::customer::SendVerificationRequest,
            dtos::customer::VerifyEmailRequest,
            dtos::events::PublishEventRequest,
            dtos::events::PublishEventResponse,
            models::Customer,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Actor authentication through auth providers"),
        (name = "Store", description = "Customer accounts and email verification"),
        (name = "Admin", description = "Administrative operations"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "admin_api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-admin-api-key"))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: CommerceConfig,
    pub stores: Stores,
    pub email: Arc<dyn EmailProvider>,
    pub tokens: TokenService,
    pub auth: AuthModule,
    pub notifications: NotificationService,
    pub verification: VerificationService,
    pub login: LoginService,
    pub events: EventBus,
    pub login_rate_limiter: IpRateLimiter,
    pub verification_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wires the services over `stores` and starts the event dispatcher.
    ///
    /// Must be called inside a Tokio runtime; the returned handle completes
    /// once the dispatcher has drained after `events.shutdown()`.
    pub fn build(
        config: CommerceConfig,
        stores: Stores,
        email: Arc<dyn EmailProvider>,
    ) -> Result<(Self, JoinHandle<()>), AppError> {
        let tokens = TokenService::new(&config.jwt).map_err(AppError::ConfigError)?;
        let auth = AuthModule::new(stores.identities.clone());
        let notifications = NotificationService::new(stores.notifications.clone(), email.clone());

        let verification = VerificationService::new(
            stores.customers.clone(),
            auth.clone(),
            tokens.clone(),
            notifications.clone(),
            config.urls.storefront_url(),
        );
        let login = LoginService::new(
            stores.customers.clone(),
            auth.clone(),
            tokens.clone(),
            verification.clone(),
            config.login.allow_customer_backfill,
        );

        let registry = build_registry(SubscriberContext {
            orders: stores.orders.clone(),
            notifications: notifications.clone(),
            urls: config.urls.clone(),
        });
        let (events, dispatcher) = EventBus::start(Arc::new(registry), config.events.queue_size);

        let limits = &config.rate_limit;
        let login_rate_limiter =
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds);
        let verification_rate_limiter = create_ip_rate_limiter(
            limits.verification_attempts,
            limits.verification_window_seconds,
        );
        let ip_rate_limiter =
            create_ip_rate_limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        let state = Self {
            config,
            stores,
            email,
            tokens,
            auth,
            notifications,
            verification,
            login,
            events,
            login_rate_limiter,
            verification_rate_limiter,
            ip_rate_limiter,
        };

        Ok((state, dispatcher))
    }
}

pub fn build_router(state: AppState) -> Router {
    // Provider login, gated for customer emailpass
    let auth_routes = Router::new()
        .route(
            "/auth/:actor_type/:auth_provider",
            get(handlers::authenticate).post(handlers::authenticate),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::verification_gate_middleware,
        ))
        .route("/store/customers/login", post(handlers::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let verification_routes = Router::new()
        .route(
            "/store/customers/send-verification",
            post(handlers::send_verification),
        )
        .route("/store/customers/verify-email", post(handlers::verify_email))
        .route(
            "/auth/:actor_type/:auth_provider/reset-password",
            post(handlers::reset_password),
        )
        .layer(from_fn_with_state(
            state.verification_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let admin_routes = Router::new()
        .route("/admin/events", post(handlers::publish_event))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    if state.config.environment == Environment::Dev {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    app.route(
        "/auth/:actor_type/:auth_provider/register",
        post(handlers::register),
    )
    .route(
        "/auth/:actor_type/:auth_provider/update",
        post(handlers::update_provider),
    )
    .route("/store/customers", post(handlers::create_customer))
    .merge(auth_routes)
    .merge(verification_routes)
    .merge(admin_routes)
    .with_state(state.clone())
    .layer(from_fn_with_state(
        state.ip_rate_limiter.clone(),
        ip_rate_limit_middleware,
    ))
    .layer(from_fn(metrics_middleware))
    .layer(TraceLayer::new_for_http().make_span_with(
        |request: &service_core::axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");

            tracing::info_span!(
                "http_request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
            )
        },
    ))
    .layer(from_fn(request_id_middleware))
    .layer(from_fn(security_headers_middleware))
    .layer(cors_layer(&state.config.urls.store_cors))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-admin-api-key"),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.stores.health.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable
    })?;

    state.email.health_check().await.map_err(|e| {
        tracing::error!(provider = state.email.name(), error = %e, "Email provider health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": "up",
            "email": state.email.name(),
        }
    })))
}
