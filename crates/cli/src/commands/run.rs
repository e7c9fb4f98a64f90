//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use super::{load_settings, shutdown_signal};
use crate::cli::RunArgs;
use crate::node::{EdgeSourceMode, Node, NodeConfig};

/// Execute the `run` command
pub async fn run_node(args: &RunArgs) -> Result<()> {
    let path = &args.config.config;
    info!(config = %path.display(), "Loading configuration");

    let settings = load_settings(path)?;
    info!(
        radar_id = %settings.node.radar_id,
        distance_m = settings.sensors.distance_m,
        speed_limit_kmh = settings.sensors.speed_limit_kmh,
        sync_enabled = settings.sync.is_enabled(),
        "Configuration loaded"
    );

    let source = match &args.replay {
        Some(path) => EdgeSourceMode::Replay {
            path: path.clone(),
            speed: args.replay_speed,
        },
        None => EdgeSourceMode::Simulated,
    };

    let node = Node::new(NodeConfig {
        settings,
        source,
        max_measurements: (args.max_measurements > 0).then_some(args.max_measurements),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Starting radar node...");
    let stats = node
        .run(shutdown_signal())
        .await
        .context("Radar node failed")?;

    stats.print_summary();
    info!("Radar node finished");
    Ok(())
}
