//! HTTP server binary: the retrieval and ingestion surface.

use std::time::Duration;

use anyhow::Context;
use api_router::{api_routes_v1, api_state::ApiState};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = common::utils::config::get_config().context("failed to load configuration")?;
    let state = ApiState::new(&config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to build API state: {e}"))?;

    let app = api_routes_v1(&state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_seconds,
        )));

    let address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(%address, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
