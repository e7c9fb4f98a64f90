//! Error types for CLI operations.

use std::net::SocketAddr;

use contracts::ContractError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or failed validation
    #[error("Invalid configuration in {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: ContractError,
    },

    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Edge source could not be prepared
    #[error("Edge source unavailable: {message}")]
    EdgeSource { message: String },

    /// Queue journal is held by another process
    #[error("Queue {path} is in use by a running radar node; stop it before running this command")]
    QueueBusy { path: String },

    /// Unknown measurement id passed to requeue
    #[error("Measurement {id} is not flagged as rejected")]
    NotRejected { id: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn edge_source(message: impl Into<String>) -> Self {
        Self::EdgeSource {
            message: message.into(),
        }
    }
}
