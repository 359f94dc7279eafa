use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dashsync_core::{RawDatasetParser, SyncService};
use dashsync_logging::DashsyncSubscriberBuilder;
use dashsync_server::{Cli, ServerConfig, router};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(&cli, |key| std::env::var(key).ok())?;

    let _log_guard = DashsyncSubscriberBuilder::new()
        .with_config(config.logging.clone())
        .init()?;

    let service = Arc::new(SyncService::from_config(config.sync.clone(), RawDatasetParser)?);
    service.start().await?;

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, router(Arc::clone(&service)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
