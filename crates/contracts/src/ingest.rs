//! IngestClient trait - Sync Engine output interface
//!
//! The node-side view of the central ingestion contract: one submission per
//! call, keyed by measurement id, answered with an acknowledgment or a
//! classified failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{MeasurementId, MeasurementSubmission};

/// Successful acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestAck {
    /// First acceptance of this id
    Accepted,
    /// Id already stored; absorbed without a second record
    Duplicate,
}

/// Delivery failure, classified by what the sync engine should do about it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Network unreachable, connection reset, DNS failure...
    #[error("transport error: {message}")]
    Transport { message: String },

    /// No answer within the per-attempt bound
    #[error("delivery timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Central side failed (5xx or unexpected status)
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// Payload refused as malformed; resending it unchanged cannot succeed
    #[error("submission rejected (status {status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// Credentials refused
    #[error("authentication rejected (status {status})")]
    Unauthorized { status: u16 },
}

/// What a failure means for the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Leave Pending, retry next cycle
    Transient,
    /// Flag the entry for operator attention
    Rejection,
    /// Stop delivering until settings change
    Authentication,
}

impl DeliveryError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            DeliveryError::Transport { .. }
            | DeliveryError::Timeout { .. }
            | DeliveryError::Server { .. } => FailureClass::Transient,
            DeliveryError::Rejected { .. } => FailureClass::Rejection,
            DeliveryError::Unauthorized { .. } => FailureClass::Authentication,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }
}

/// Data output trait toward the central aggregator
#[trait_variant::make(IngestClient: Send)]
pub trait LocalIngestClient {
    /// Endpoint description (used for logging)
    fn endpoint(&self) -> &str;

    /// Submit one measurement
    ///
    /// Implementations should bound their own I/O; the sync engine applies
    /// an outer timeout as well.
    async fn submit(&self, submission: &MeasurementSubmission) -> Result<IngestAck, DeliveryError>;
}

/// Field-level validation problem reported by the central side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Outcome label in an ingestion reply body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Created,
    Duplicate,
    Invalid,
    Unauthorized,
    Error,
}

/// JSON body returned by the ingestion endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReply {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MeasurementId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
