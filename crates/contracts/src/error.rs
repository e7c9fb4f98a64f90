//! Settings and identifier errors
//!
//! Delivery failures are classified separately in `ingest.rs`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    /// Settings file is not valid TOML/JSON or does not match the schema
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Settings parsed but a value is out of range or inconsistent
    #[error("invalid setting '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Measurement id is not a UUID
    #[error("invalid measurement id '{value}': {message}")]
    InvalidId { value: String, message: String },

    /// Settings file could not be read
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}
