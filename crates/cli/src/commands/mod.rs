//! Command implementations.

mod central;
mod info;
mod queue;
mod run;
mod validate;

pub use central::run_central;
pub use info::run_info;
pub use queue::{run_compact, run_queue, run_requeue};
pub use run::run_node;
pub use validate::run_validate;

use std::path::Path;

use contracts::NodeSettings;

use crate::error::CliError;

/// Load and validate node settings
pub(crate) fn load_settings(path: &Path) -> Result<NodeSettings, CliError> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    config_loader::ConfigLoader::load_from_path(path).map_err(|source| CliError::Config {
        path: path.display().to_string(),
        source,
    })
}

/// Wait for Ctrl+C or SIGTERM
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
