//! Settings parsing
//!
//! Supports TOML (primary) and JSON.

use contracts::ContractError;
use serde::de::DeserializeOwned;

/// Settings file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON (what the config gateway pushes)
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML content
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON content
pub fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse according to format
pub fn parse<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> Result<T, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::NodeSettings;

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[node]
radar_id = "gate-north"
api_token = "secret"

[sensors]
distance_m = 2.0
speed_limit_kmh = 30.0
"#;
        let result: Result<NodeSettings, _> = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let settings = result.unwrap();
        assert_eq!(settings.node.radar_id, "gate-north");
        assert_eq!(settings.sensors.distance_m, 2.0);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "node": { "radar_id": "r1", "api_token": "t" },
            "sensors": { "distance_m": 1.0, "trigger_edge": "both" },
            "sync": { "central_url": "http://10.0.0.5:8090", "central_token": "c", "interval_secs": 15 }
        }"#;
        let result: Result<NodeSettings, _> = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        assert_eq!(result.unwrap().sync.interval_secs, 15);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result: Result<NodeSettings, _> = parse_toml("invalid toml [[[");
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("env"), None);
    }
}
