// src/main.rs
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gpfs_exporter::collector::build_collectors;
use gpfs_exporter::config::ExporterConfig;
use gpfs_exporter::exposition::{Gatherer, router};
use gpfs_exporter::runner::{CommandRunner, ProcessRunner};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ExporterConfig::parse();
    init_logging(&config.log_level);

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new(config.sudo()));

    let mut gatherer = Gatherer::new();
    for collector in build_collectors(&config, runner) {
        info!(collector = collector.name(), "enabled collector");
        gatherer.register(collector)?;
    }
    if config.use_cache {
        info!("fallback cache enabled");
    }

    let listener = TcpListener::bind(&config.listen).await?;
    info!("Serving metrics on {}", listener.local_addr()?);

    axum::serve(listener, router(Arc::new(gatherer)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down");
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
