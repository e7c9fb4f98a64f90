//! `central` command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use central::{IngestionService, JournalRecordStore, MemoryRecordStore, RecordStore};
use contracts::CentralSettings;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use super::shutdown_signal;
use crate::cli::CentralArgs;
use crate::error::CliError;

/// Execute the `central` command
pub async fn run_central(args: &CentralArgs) -> Result<()> {
    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }
    let settings = config_loader::ConfigLoader::load_central_from_path(&args.config).map_err(
        |source| CliError::Config {
            path: args.config.display().to_string(),
            source,
        },
    )?;

    if args.metrics_port > 0 {
        observability::install_prometheus(args.metrics_port)?;
    }

    match settings.store_path.clone() {
        Some(path) => {
            let store = JournalRecordStore::open(&path)
                .await
                .with_context(|| format!("Failed to open record store at {}", path.display()))?;
            serve(&settings, store).await
        }
        None => {
            warn!("No store_path configured - records are kept in memory only");
            serve(&settings, MemoryRecordStore::new()).await
        }
    }
}

async fn serve<S>(settings: &CentralSettings, store: S) -> Result<()>
where
    S: RecordStore + Sync + 'static,
{
    let listener = TcpListener::bind(settings.listen)
        .await
        .map_err(|source| CliError::Bind {
            addr: settings.listen,
            source,
        })?;

    let service = Arc::new(IngestionService::new(store, settings.api_token.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(central::serve(listener, Arc::clone(&service), shutdown_rx));

    shutdown_signal().await;
    warn!("Received shutdown signal, stopping central server...");
    let _ = shutdown_tx.send(true);

    server
        .await
        .context("Central server task failed")?
        .context("Central server failed")?;

    let records = service.store().count().await?;
    info!(records, "Central server stopped");
    Ok(())
}
