//! smsgate web server.
//!
//! This binary:
//! - Loads configuration and refuses to start without a webhook secret
//! - Opens the SQLite store and applies the schema
//! - Serves the webhook, query, stats, health and metrics endpoints

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use smsgate::config::log_level_from_env;
use smsgate::{router, AppState, Config, MessageStore, Metrics};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging (RUST_LOG, then LOG_LEVEL)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level_from_env()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration from environment; a missing webhook secret aborts startup
    let config = Config::from_env().map_err(|e| {
        error!(error = %e, "config_invalid");
        e
    })?;
    info!(
        port = config.port,
        database_url = %config.database_url,
        db_max_connections = config.db_max_connections,
        log_level = %config.log_level,
        "config_loaded"
    );

    // Open the database and apply the schema before accepting traffic
    let store = MessageStore::connect(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to open database")?;
    store.migrate().await.context("Failed to migrate database")?;

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    let state = AppState::new(store.clone(), &config.webhook_secret, metrics);
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    store.close().await;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
