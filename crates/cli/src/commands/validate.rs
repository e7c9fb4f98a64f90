//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::NodeSettings;
use serde::Serialize;
use tracing::info;

use super::load_settings;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    radar_id: String,
    distance_m: f64,
    speed_limit_kmh: f64,
    sync_enabled: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    let path = &args.config.config;
    info!(config = %path.display(), "Validating configuration");

    let result = validate_config(path);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(path: &std::path::Path) -> ValidationResult {
    let config_path = path.display().to_string();

    match load_settings(path) {
        Ok(settings) => ValidationResult {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(&settings),
            summary: Some(ConfigSummary {
                version: format!("{:?}", settings.version),
                radar_id: settings.node.radar_id.clone(),
                distance_m: settings.sensors.distance_m,
                speed_limit_kmh: settings.sensors.speed_limit_kmh,
                sync_enabled: settings.sync.is_enabled(),
            }),
        },
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: Vec::new(),
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(settings: &NodeSettings) -> Vec<String> {
    let mut warnings = Vec::new();

    if !settings.sync.is_enabled() {
        warnings.push("No sync.central_url configured - measurements stay local".to_string());
    }
    if settings
        .sync
        .central_url
        .as_deref()
        .is_some_and(|url| url.starts_with("http://"))
    {
        warnings.push("sync.central_url uses plain http - bearer token is sent unencrypted".to_string());
    }
    if settings.node.name.is_none() {
        warnings.push("node.name is not set - submissions carry no radar name".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Radar: {}", summary.radar_id);
            println!("  Beam distance: {} m", summary.distance_m);
            println!("  Speed limit: {} km/h", summary.speed_limit_kmh);
            println!("  Sync: {}", if summary.sync_enabled { "enabled" } else { "disabled" });
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_reports_missing_file() {
        let result = validate_config(std::path::Path::new("/nonexistent/radar.toml"));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[test]
    fn test_validate_collects_warnings() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[node]
radar_id = "gate-north"
api_token = "secret"

[sensors]
distance_m = 1.5
"#
        )
        .unwrap();

        let result = validate_config(file.path());
        assert!(result.valid, "{:?}", result.error);
        assert_eq!(result.warnings.len(), 2);
        assert_eq!(result.summary.unwrap().radar_id, "gate-north");
    }
}
