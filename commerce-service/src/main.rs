use commerce_service::{
    build_router,
    config::{CommerceConfig, StorageBackend},
    services::{EmailProvider, MemoryStore, MockEmailProvider, MongoStore, SmtpEmailProvider, Stores},
    AppState,
};
use service_core::error::AppError;
use service_core::observability::{init_metrics_recorder, init_tracing};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = CommerceConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics_recorder();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting commerce service"
    );

    let stores = match config.storage.backend {
        StorageBackend::Mongodb => {
            tracing::info!("Initializing MongoDB store");
            let store =
                MongoStore::connect(&config.storage.mongodb_uri, &config.storage.mongodb_database)
                    .await?;
            store.initialize_indexes().await?;
            Stores::from_backend(Arc::new(store))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Stores::from_backend(Arc::new(MemoryStore::new()))
        }
    };

    let email: Arc<dyn EmailProvider> = if config.smtp.enabled {
        let provider = SmtpEmailProvider::new(config.smtp.clone())
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
        Arc::new(provider)
    } else {
        tracing::warn!("SMTP disabled; emails are captured in memory and not delivered");
        Arc::new(MockEmailProvider::new())
    };
    tracing::info!(provider = email.name(), "Email provider initialized");

    let (state, dispatcher) = AppState::build(config.clone(), stores, email)?;
    let events = state.events.clone();
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Listening");

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    events.shutdown();
    if let Err(e) = dispatcher.await {
        tracing::error!(error = %e, "Event dispatcher terminated abnormally");
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
