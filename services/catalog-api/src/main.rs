//! MyGameList catalog API
//!
//! Single-binary Rust service that:
//! 1. Verifies inbound callers against the external identity service
//! 2. Builds IGDB queries for the catalog routes
//! 3. Sends them through the credential-refreshing upstream gateway
//! 4. Serves the cacheable list routes from a TTL response cache

mod avatar;
mod cache;
mod config;
mod error;
mod identity;
mod metrics;
mod queries;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use igdb_auth::CredentialStore;
use igdb_gateway::{RetryPolicy, UpstreamGateway};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::avatar::{AvatarStore, FsAvatarStore};
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::identity::{HttpIdentityVerifier, IdentityVerifier};
use crate::metrics::ServiceMetrics;
use crate::routes::AppState;

/// How long in-flight requests may drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting gamelist-catalog-api");

    // Install the Prometheus recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        api_base_url = %config.igdb.api_base_url,
        cache_ttl_secs = config.cache.ttl_secs,
        retry_limit = config.igdb.retry_limit,
        "configuration loaded"
    );

    let client_secret = config
        .igdb
        .client_secret
        .take()
        .context("client secret missing after config load")?;

    let client = reqwest::Client::new();

    let store = Arc::new(CredentialStore::new(
        config.igdb.credential_file.clone(),
        client.clone(),
        config.igdb.token_url.clone(),
        config.igdb.client_id.clone(),
        client_secret,
    ));

    let gateway = Arc::new(UpstreamGateway::new(
        client.clone(),
        config.igdb.api_base_url.clone(),
        store,
        Duration::from_millis(config.igdb.request_timeout_ms),
        RetryPolicy {
            retry_limit: config.igdb.retry_limit,
            base_delay: Duration::from_millis(config.igdb.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.igdb.retry_max_delay_ms),
        },
    ));

    let verifier: Arc<dyn IdentityVerifier> = Arc::new(HttpIdentityVerifier::new(
        client.clone(),
        config.identity.verify_url.clone(),
    ));

    let avatars: Arc<dyn AvatarStore> = Arc::new(FsAvatarStore::new(
        config.avatar.storage_dir.clone(),
        config.avatar.public_base_url.clone(),
    ));

    let app_state = AppState {
        gateway,
        cache: Arc::new(ResponseCache::new(Duration::from_secs(config.cache.ttl_secs))),
        verifier,
        avatars,
        metrics: ServiceMetrics::new(),
        prometheus: prometheus_handle,
    };

    let app = routes::build_router(app_state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;

    info!(addr = %config.server.listen_addr, "accepting requests");

    // Graceful shutdown with drain timeout enforcement:
    // 1. shutdown_signal() fires on SIGTERM/SIGINT
    // 2. axum stops accepting new connections and drains in-flight requests
    // 3. DRAIN_TIMEOUT bounds the drain so a slow client cannot block exit
    //
    // The drain timer starts when the signal fires, not when the server
    // starts: notify the server to drain, then race the drain against the
    // timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
