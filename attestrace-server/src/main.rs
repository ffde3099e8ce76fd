//! Attestrace Server - HTTP API for attested conversation traces
//!
//! Exposes attestrace-core over a single dispatch endpoint:
//! - POST /        - Issue a challenge, or verify and store a trace
//! - GET  /health  - Health check
//! - GET  /api-docs/openapi.json - OpenAPI document

use std::net::SocketAddr;

use attestrace_server::{create_router_with_config, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("attestrace_server=info,attestrace_core=info,tower_http=info")
        }))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        tier = %config.tier,
        app_id = %config.app_id,
        trust_root = %config.trust_root.fingerprint(),
        store = ?config.store,
        "Starting attestrace-server"
    );

    let app = match create_router_with_config(&config) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build application");
            std::process::exit(1);
        }
    };

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on http://{}", addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        return;
    }
    tracing::info!("Shutdown signal received");
}
