//! scene-relay server entry point.
//!
//! Starts the Axum HTTP server with the scene REST endpoints, the listener
//! WebSocket endpoint and the static file fallback.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use scene_relay::api;
use scene_relay::app_state::AppState;
use scene_relay::cache::{CacheBackend, MemoryCache, ObjectCache, PostgresCache, SceneStore};
use scene_relay::config::{CacheBackendKind, LogFormat, RelayConfig};
use scene_relay::domain::Registry;
use scene_relay::service::RelayService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = RelayConfig::from_env().map_err(|err| anyhow::anyhow!(err))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, backend = ?config.cache_backend, "starting scene-relay");

    // Build cache layer
    let backend = match config.cache_backend {
        CacheBackendKind::Memory => CacheBackend::Memory(MemoryCache::new()),
        CacheBackendKind::Postgres => {
            let cache = PostgresCache::connect(
                &config.database_url,
                config.database_max_connections,
                Duration::from_secs(config.database_connect_timeout_secs),
            )
            .await
            .context("connecting object cache")?;
            CacheBackend::Postgres(cache)
        }
    };
    let store = SceneStore::new(ObjectCache::new(backend, config.cache_timeout()));

    // Build domain and service layers
    let registry = Registry::spawn(config.registry_queue_capacity);
    let relay_service = Arc::new(RelayService::new(registry, store, config.relay_limits()));

    // Build application state
    let app_state = AppState {
        relay_service: Arc::clone(&relay_service),
        connection_settings: config.connection_settings(),
    };
    let app = api::build_app(app_state, &config.static_dir);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    let registry = relay_service.registry().clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            registry.shutdown().await;
        })
        .await?;

    relay_service.shutdown().await;
    tracing::info!("scene-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
