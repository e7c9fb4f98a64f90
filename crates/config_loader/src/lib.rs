//! # Config Loader
//!
//! Settings loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON settings files
//! - Validate settings legality
//! - Produce an immutable `NodeSettings` (or `CentralSettings`)
//!
//! Settings are read once at startup. There is no reload path: the config
//! gateway writes a new file and restarts the service.
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let settings = ConfigLoader::load_from_path(Path::new("radar.toml")).unwrap();
//! println!("Radar: {}", settings.node.radar_id);
//! ```

mod parser;
mod validator;

pub use contracts::{CentralSettings, NodeSettings};
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Settings loader
///
/// Provides static methods to load settings from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load node settings from a file path
    ///
    /// Format is detected from the file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<NodeSettings, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load node settings from a string
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<NodeSettings, ContractError> {
        let settings: NodeSettings = parser::parse(content, format)?;
        validator::validate(&settings)?;
        Ok(settings)
    }

    /// Load central aggregator settings from a file path
    pub fn load_central_from_path(path: &Path) -> Result<CentralSettings, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_central_from_str(&content, format)
    }

    /// Load central aggregator settings from a string
    pub fn load_central_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<CentralSettings, ContractError> {
        let settings: CentralSettings = parser::parse(content, format)?;
        validator::validate_central(&settings)?;
        Ok(settings)
    }

    /// Serialize settings to a TOML string
    pub fn to_toml(settings: &NodeSettings) -> Result<String, ContractError> {
        toml::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize settings to a JSON string
    pub fn to_json(settings: &NodeSettings) -> Result<String, ContractError> {
        serde_json::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer the format from the file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}
