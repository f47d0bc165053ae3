//! Serve command - loads the models and answers prediction requests over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use config::Config;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::http::{AppState, router};
use crate::loader::load_registry;

/// Runs the serve command until Ctrl+C is received.
///
/// # Errors
///
/// Returns an error if the models fail to load under the strict policy, or
/// the listener cannot be bound.
pub async fn run(config: &Config) -> Result<()> {
    let registry = load_registry(config, config.load_policy).await?;
    if registry.is_empty() {
        warn!("No models loaded, only /ping will succeed");
    }

    let state = AppState::new(
        Arc::new(registry),
        config.tabular.as_ref().map(|m| m.name.clone()),
        config.image.as_ref().map(|m| m.name.clone()),
    );
    let app = router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "Model server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Model server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        core::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
