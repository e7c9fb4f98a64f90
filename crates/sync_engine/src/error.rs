//! Sync engine error types

use local_queue::QueueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Central endpoint URL unusable
    #[error("invalid central url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Endpoint configured without credentials
    #[error("central_url is set but central_token is missing")]
    MissingToken,

    /// HTTP client construction failed
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
