//! Settings validation
//!
//! Field-level ranges come from the `validator` derives on the settings
//! structs. Cross-field rules live here:
//! - radar_id non-blank, same rule the central side applies
//! - sensor pins distinct
//! - max_speed_kmh > speed_limit_kmh
//! - request_timeout_secs < interval_secs
//! - central_url requires central_token

use contracts::{radar_id_problem, CentralSettings, ContractError, NodeSettings};
use validator::Validate;

/// Validate node settings
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(settings: &NodeSettings) -> Result<(), ContractError> {
    validate_fields(settings)?;
    validate_radar_id(settings)?;
    validate_pins(settings)?;
    validate_speed_bounds(settings)?;
    validate_sync(settings)?;
    Ok(())
}

/// Validate central aggregator settings
pub fn validate_central(settings: &CentralSettings) -> Result<(), ContractError> {
    settings
        .validate()
        .map_err(|e| ContractError::config_validation("central", e.to_string()))
}

fn validate_fields(settings: &NodeSettings) -> Result<(), ContractError> {
    settings
        .validate()
        .map_err(|e| ContractError::config_validation("settings", e.to_string()))
}

fn validate_radar_id(settings: &NodeSettings) -> Result<(), ContractError> {
    match radar_id_problem(&settings.node.radar_id) {
        Some(problem) => Err(ContractError::config_validation(
            "node.radar_id",
            format!("radar_id {problem}"),
        )),
        None => Ok(()),
    }
}

fn validate_pins(settings: &NodeSettings) -> Result<(), ContractError> {
    let sensors = &settings.sensors;
    if sensors.a_pin == sensors.b_pin {
        return Err(ContractError::config_validation(
            "sensors.a_pin / sensors.b_pin",
            format!("sensor pins must differ, both are {}", sensors.a_pin),
        ));
    }
    Ok(())
}

fn validate_speed_bounds(settings: &NodeSettings) -> Result<(), ContractError> {
    let sensors = &settings.sensors;
    if sensors.max_speed_kmh <= sensors.speed_limit_kmh {
        return Err(ContractError::config_validation(
            "sensors.max_speed_kmh",
            format!(
                "max_speed_kmh ({}) must be greater than speed_limit_kmh ({})",
                sensors.max_speed_kmh, sensors.speed_limit_kmh
            ),
        ));
    }
    Ok(())
}

fn validate_sync(settings: &NodeSettings) -> Result<(), ContractError> {
    let sync = &settings.sync;

    if sync.request_timeout_secs >= sync.interval_secs {
        return Err(ContractError::config_validation(
            "sync.request_timeout_secs",
            format!(
                "request_timeout_secs ({}) must be shorter than interval_secs ({})",
                sync.request_timeout_secs, sync.interval_secs
            ),
        ));
    }

    if sync.central_url.is_some()
        && sync
            .central_token
            .as_deref()
            .map(str::is_empty)
            .unwrap_or(true)
    {
        return Err(ContractError::config_validation(
            "sync.central_token",
            "central_token is required when central_url is set",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ApiSettings, CaptureSettings, NodeIdentity, SensorSettings, SettingsVersion,
        StorageSettings, SyncSettings,
    };

    fn minimal_settings() -> NodeSettings {
        NodeSettings {
            version: SettingsVersion::V1,
            node: NodeIdentity {
                radar_id: "gate-north".into(),
                name: Some("North gate".into()),
                location: None,
                api_token: "secret".into(),
            },
            sensors: SensorSettings::default(),
            capture: CaptureSettings::default(),
            storage: StorageSettings::default(),
            sync: SyncSettings {
                central_url: Some("http://central.local:8090".into()),
                central_token: Some("central-secret".into()),
                ..Default::default()
            },
            api: ApiSettings::default(),
        }
    }

    #[test]
    fn test_valid_settings() {
        let settings = minimal_settings();
        assert!(validate(&settings).is_ok());
    }

    #[test]
    fn test_radar_id_blank_rejected_multibyte_accepted() {
        let mut settings = minimal_settings();
        settings.node.radar_id = "   ".into();
        let err = validate(&settings).unwrap_err().to_string();
        assert!(err.contains("radar_id must not be empty"), "got: {err}");

        // 62 characters, 74 bytes
        settings.node.radar_id = "portão-condomínio-são-joão-ção-".repeat(2);
        assert!(validate(&settings).is_ok());
    }

    #[test]
    fn test_same_pins_rejected() {
        let mut settings = minimal_settings();
        settings.sensors.b_pin = settings.sensors.a_pin;
        let err = validate(&settings).unwrap_err().to_string();
        assert!(err.contains("pins must differ"), "got: {err}");
    }

    #[test]
    fn test_ceiling_below_limit_rejected() {
        let mut settings = minimal_settings();
        settings.sensors.speed_limit_kmh = 50.0;
        settings.sensors.max_speed_kmh = 40.0;
        let err = validate(&settings).unwrap_err().to_string();
        assert!(err.contains("max_speed_kmh"), "got: {err}");
    }

    #[test]
    fn test_timeout_not_shorter_than_interval() {
        let mut settings = minimal_settings();
        settings.sync.interval_secs = 5;
        settings.sync.request_timeout_secs = 5;
        let err = validate(&settings).unwrap_err().to_string();
        assert!(err.contains("request_timeout_secs"), "got: {err}");
    }

    #[test]
    fn test_url_without_token() {
        let mut settings = minimal_settings();
        settings.sync.central_token = None;
        let err = validate(&settings).unwrap_err().to_string();
        assert!(err.contains("central_token"), "got: {err}");
    }

    #[test]
    fn test_sync_disabled_needs_no_token() {
        let mut settings = minimal_settings();
        settings.sync.central_url = None;
        settings.sync.central_token = None;
        assert!(validate(&settings).is_ok());
    }

    #[test]
    fn test_field_errors_surface() {
        let mut settings = minimal_settings();
        settings.node.api_token = String::new();
        let err = validate(&settings).unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
        assert!(err.to_string().contains("api_token"), "got: {err}");
    }
}
