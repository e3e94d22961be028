mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use codetest_common::config::HarnessConfig;
use codetest_harness::Harness;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub harness: Harness,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::routes())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("codetest API booting...");

    let config = HarnessConfig::load_default().context("Failed to load harness configuration")?;
    info!(
        engine = ?config.engine,
        default_timeout_ms = config.default_timeout_ms,
        max_timeout_ms = config.max_timeout_ms,
        "Configuration loaded"
    );

    let harness = Harness::from_config(config).context("Failed to initialize execution engine")?;

    // Refuse to serve if the interpreter is unusable
    for (language, version) in harness.probe().await.context("Engine probe failed")? {
        info!(language = %language, version = %version, "Engine ready");
    }

    metrics::register().context("Failed to register metrics")?;

    let state = Arc::new(AppState { harness });

    let addr = std::env::var("CODETEST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app(state)).await.context("Server error")?;

    Ok(())
}
