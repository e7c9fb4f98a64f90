//! Local queue error types

use contracts::MeasurementId;
use thiserror::Error;

/// Local queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    /// Measurement id already present
    #[error("measurement {id} is already queued")]
    DuplicateId { id: MeasurementId },

    /// Measurement id never recorded
    #[error("measurement {id} is not in the queue")]
    UnknownId { id: MeasurementId },

    /// Encoded entry exceeds the frame size limit
    #[error("journal frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// Entry could not be encoded
    #[error("journal encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Another handle owns the journal (a running node, or another command)
    #[error("journal {path} is in use by another process; stop the radar node first")]
    Locked { path: String },

    /// An append failed and the partial frame could not be cut back;
    /// further appends would land behind it
    #[error("journal {path} has an unrepaired partial frame; reopen to recover")]
    JournalPoisoned { path: String },

    /// A previous holder of the queue lock panicked
    #[error("queue lock poisoned")]
    Poisoned,

    /// Blocking worker task failed
    #[error("queue worker failed: {0}")]
    Worker(String),
}
