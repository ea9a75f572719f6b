//! Conductor Binary
//!
//! Runs the orchestration engine against the in-memory store until Ctrl-C.
//! An optional first argument names the configuration directory.

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use pipeline_conductor::config::ConfigManager;
use pipeline_conductor::logging::init_structured_logging;
use pipeline_conductor::orchestration::{NoopPipelineExecutor, OrchestrationEngine};
use pipeline_conductor::store::InMemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let manager = match std::env::args().nth(1) {
        Some(dir) => ConfigManager::load_from_directory(Some(dir.into())),
        None => ConfigManager::load(),
    }
    .context("failed to load configuration")?;

    init_structured_logging(&manager.config().logging);
    info!(
        environment = %manager.environment(),
        config_directory = %manager.config_directory().display(),
        "Starting pipeline conductor"
    );

    let engine = OrchestrationEngine::new(
        manager.config().clone(),
        Arc::new(InMemoryStore::new()),
        Arc::new(NoopPipelineExecutor),
    )
    .context("failed to build orchestration engine")?;

    engine.start().await.context("failed to start engine")?;
    info!("Conductor running, press Ctrl-C to stop");

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    engine.shutdown().await;
    info!("Conductor stopped");

    Ok(())
}
