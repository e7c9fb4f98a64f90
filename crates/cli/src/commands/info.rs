//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::NodeSettings;
use serde::Serialize;
use tracing::info;

use super::load_settings;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    node: NodeInfo,
    sensors: SensorInfo,
    storage: StorageInfo,
    sync: SyncInfo,
    api_listen: String,
}

#[derive(Serialize)]
struct NodeInfo {
    radar_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

#[derive(Serialize)]
struct SensorInfo {
    a_pin: u8,
    b_pin: u8,
    distance_m: f64,
    speed_limit_kmh: f64,
    max_speed_kmh: f64,
    pairing_timeout_ms: u64,
    trigger_edge: String,
}

#[derive(Serialize)]
struct StorageInfo {
    queue_path: String,
    compact_on_start: bool,
}

#[derive(Serialize)]
struct SyncInfo {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    central_url: Option<String>,
    interval_secs: u64,
    request_timeout_secs: u64,
    batch_size: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let path = &args.config.config;
    info!(config = %path.display(), "Loading configuration info");

    let settings = load_settings(path)?;

    if args.json {
        let info = build_config_info(&settings);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&settings);
    }

    Ok(())
}

fn build_config_info(settings: &NodeSettings) -> ConfigInfo {
    let sensors = &settings.sensors;
    ConfigInfo {
        version: format!("{:?}", settings.version),
        node: NodeInfo {
            radar_id: settings.node.radar_id.clone(),
            name: settings.node.name.clone(),
            location: settings.node.location.clone(),
        },
        sensors: SensorInfo {
            a_pin: sensors.a_pin,
            b_pin: sensors.b_pin,
            distance_m: sensors.distance_m,
            speed_limit_kmh: sensors.speed_limit_kmh,
            max_speed_kmh: sensors.max_speed_kmh,
            pairing_timeout_ms: sensors.pairing_timeout_ms,
            trigger_edge: format!("{:?}", sensors.trigger_edge),
        },
        storage: StorageInfo {
            queue_path: settings.storage.queue_path.display().to_string(),
            compact_on_start: settings.storage.compact_on_start,
        },
        sync: SyncInfo {
            enabled: settings.sync.is_enabled(),
            central_url: settings.sync.central_url.clone(),
            interval_secs: settings.sync.interval_secs,
            request_timeout_secs: settings.sync.request_timeout_secs,
            batch_size: settings.sync.batch_size,
        },
        api_listen: settings.api.listen.to_string(),
    }
}

fn print_config_info(settings: &NodeSettings) {
    let node = &settings.node;
    let sensors = &settings.sensors;
    let sync = &settings.sync;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  Radar Node Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📍 Node");
    println!("   ├─ Version: {:?}", settings.version);
    println!("   ├─ Radar ID: {}", node.radar_id);
    println!("   ├─ Name: {}", node.name.as_deref().unwrap_or("(unset)"));
    println!("   └─ Location: {}", node.location.as_deref().unwrap_or("(unset)"));

    println!("\n🚦 Sensors");
    println!("   ├─ Pins: A={} B={}", sensors.a_pin, sensors.b_pin);
    println!("   ├─ Beam distance: {} m", sensors.distance_m);
    println!("   ├─ Speed limit: {} km/h", sensors.speed_limit_kmh);
    println!("   ├─ Max plausible speed: {} km/h", sensors.max_speed_kmh);
    println!("   ├─ Pairing timeout: {} ms", sensors.pairing_timeout_ms);
    println!("   └─ Trigger edge: {:?}", sensors.trigger_edge);

    println!("\n💾 Storage");
    println!("   ├─ Queue: {}", settings.storage.queue_path.display());
    println!("   └─ Compact on start: {}", settings.storage.compact_on_start);

    println!("\n📡 Sync");
    match &sync.central_url {
        Some(url) => {
            println!("   ├─ Central: {}", url);
            println!("   ├─ Interval: {} s", sync.interval_secs);
            println!("   ├─ Request timeout: {} s", sync.request_timeout_secs);
            println!("   └─ Batch size: {}", sync.batch_size);
        }
        None => println!("   └─ Disabled"),
    }

    println!("\n🔌 Management API: {}", settings.api.listen);
    println!();
}
