//! Analytics microservice for the hospital records API.
//!
//! Pulls patients, visits and prescriptions from the records API and serves
//! aggregate views of them under `/analytics/*`.

pub mod client;
pub mod config;
pub mod error;
pub mod routes;
pub mod stats;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub use crate::client::ApiClient;
pub use crate::config::AnalyticsConfig;
pub use crate::error::AnalyticsError;
pub use crate::routes::{AppState, build_app};

/// `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// Binds the configured address and serves until Ctrl+C.
pub async fn run(config: AnalyticsConfig) -> anyhow::Result<()> {
    let client = ApiClient::new(&config.api).context("failed to build records API client")?;
    tracing::info!(api = client.base_url(), "records API client ready");
    let app = build_app(AppState {
        client: Arc::new(client),
    });

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "analytics service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("analytics server error")?;
    Ok(())
}
