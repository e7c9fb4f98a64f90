//! Record store error types

use local_queue::QueueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Durable journal failed
    #[error("record journal error: {0}")]
    Journal(#[from] QueueError),

    /// A previous holder of the store lock panicked
    #[error("record store lock poisoned")]
    Poisoned,

    /// Blocking worker task failed
    #[error("record store worker failed: {0}")]
    Worker(String),
}
