//! Node orchestrator - wires capture, queue, sync and the management API.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{EdgeSource, NodeSettings};
use local_queue::SharedQueue;
use node_api::ApiState;
use sync_engine::{HttpIngestClient, SyncConfig, SyncEngine};
use timing_engine::{
    CaptureClock, CapturePipeline, ReplayConfig, ReplayEdgeSource, SimulatedEdgeSource,
    SimulationConfig,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::NodeStats;
use crate::error::CliError;

/// How often the run loop checks its stop conditions
const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// How often queue gauges are refreshed
const QUEUE_GAUGE_INTERVAL: Duration = Duration::from_secs(10);
/// Bound on waiting for background tasks at shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Where sensor edges come from
#[derive(Debug, Clone)]
pub enum EdgeSourceMode {
    Simulated,
    Replay { path: PathBuf, speed: f64 },
}

/// Node run configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub settings: NodeSettings,
    pub source: EdgeSourceMode,
    /// Stop after this many recorded measurements
    pub max_measurements: Option<u64>,
    pub timeout: Option<Duration>,
    pub metrics_port: Option<u16>,
}

/// Why the run loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Signal,
    Timeout,
    MaxMeasurements,
    ReplayFinished,
}

/// Radar node runtime
pub struct Node {
    config: NodeConfig,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves or a stop condition is reached
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<NodeStats> {
        let start_time = Instant::now();
        let settings = Arc::new(self.config.settings.clone());

        if let Some(port) = self.config.metrics_port {
            observability::install_prometheus(port)?;
        }

        // Local queue
        let queue = SharedQueue::open(&settings.storage.queue_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open queue at {}",
                    settings.storage.queue_path.display()
                )
            })?;
        if settings.storage.compact_on_start {
            let compacted = queue.compact().await.context("Failed to compact queue")?;
            info!(
                frames_before = compacted.frames_before,
                frames_after = compacted.frames_after,
                "Queue compacted"
            );
        }
        let backlog = queue.stats().await?;
        observability::record_queue_stats(&backlog);
        info!(
            path = %settings.storage.queue_path.display(),
            total = backlog.total,
            pending = backlog.pending,
            rejected = backlog.rejected,
            "Local queue opened"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Capture path
        let clock = CaptureClock::start();
        let mut capture =
            CapturePipeline::start(&settings, clock, queue.clone(), shutdown_rx.clone());
        let replaying = matches!(self.config.source, EdgeSourceMode::Replay { .. });
        capture.register_source(self.edge_source(&settings, clock)?);

        // Sync engine
        let client = HttpIngestClient::from_settings(&settings.sync)
            .context("Failed to configure central client")?;
        if client.is_none() {
            warn!("No central_url configured - measurements stay in the local queue");
        }
        let engine = SyncEngine::new(queue.clone(), client, SyncConfig::from_settings(&settings));
        let sync_status = engine.subscribe();
        let sync_handle = tokio::spawn(engine.run(shutdown_rx.clone()));

        // Management API
        let listener = TcpListener::bind(settings.api.listen)
            .await
            .map_err(|source| CliError::Bind {
                addr: settings.api.listen,
                source,
            })?;
        let api_state = ApiState::new(
            Arc::clone(&settings),
            queue.clone(),
            sync_status,
            capture.metrics(),
        );
        let api_handle = tokio::spawn(node_api::serve(listener, api_state, shutdown_rx.clone()));

        capture.start_all();
        info!(
            radar_id = %settings.node.radar_id,
            max_measurements = ?self.config.max_measurements,
            "Radar node running"
        );

        let stop = tokio::select! {
            reason = self.wait_for_stop(&capture, &queue, replaying) => reason,
            _ = shutdown => StopReason::Signal,
        };
        info!(reason = ?stop, "Stopping radar node");

        // Capture drains into the queue before sync and API stop
        let capture_report = capture.shutdown().await;
        let _ = shutdown_tx.send(true);

        let sync = match tokio::time::timeout(SHUTDOWN_GRACE, sync_handle).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(error = %e, "Sync engine task failed");
                Default::default()
            }
            Err(_) => {
                warn!("Sync engine did not stop in time");
                Default::default()
            }
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, api_handle).await {
            Ok(Ok(Err(e))) => warn!(error = %e, "Management API stopped with error"),
            Ok(Err(e)) => warn!(error = %e, "Management API task failed"),
            Err(_) => warn!("Management API did not stop in time"),
            Ok(Ok(Ok(()))) => {}
        }

        let queue_stats = queue.stats().await?;
        observability::record_queue_stats(&queue_stats);

        let stats = NodeStats {
            capture: capture_report,
            queue: queue_stats,
            sync,
            duration: start_time.elapsed(),
        };
        info!(
            measurements = stats.measurements(),
            pending = stats.queue.pending,
            duration_secs = stats.duration.as_secs_f64(),
            "Radar node shutdown complete"
        );

        Ok(stats)
    }

    fn edge_source(
        &self,
        settings: &NodeSettings,
        clock: CaptureClock,
    ) -> Result<Box<dyn EdgeSource>, CliError> {
        match &self.config.source {
            EdgeSourceMode::Simulated => {
                info!("Running with SIMULATED edge source");
                Ok(Box::new(SimulatedEdgeSource::new(
                    clock,
                    SimulationConfig {
                        distance_m: settings.sensors.distance_m,
                        ..Default::default()
                    },
                )))
            }
            EdgeSourceMode::Replay { path, speed } => {
                info!(path = %path.display(), speed, "Running in REPLAY mode");
                let source = ReplayEdgeSource::load(
                    path,
                    clock,
                    ReplayConfig {
                        speed_multiplier: *speed,
                    },
                )
                .map_err(|e| CliError::edge_source(format!("{}: {e}", path.display())))?;
                Ok(Box::new(source))
            }
        }
    }

    async fn wait_for_stop(
        &self,
        capture: &CapturePipeline,
        queue: &SharedQueue,
        replaying: bool,
    ) -> StopReason {
        let deadline = self.config.timeout.map(|t| tokio::time::Instant::now() + t);
        let metrics = capture.metrics();
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        let mut last_gauge = Instant::now();

        loop {
            ticker.tick().await;

            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                return StopReason::Timeout;
            }
            if let Some(max) = self.config.max_measurements {
                if metrics.persisted() >= max {
                    info!(measurements = metrics.persisted(), "Reached max measurements limit");
                    return StopReason::MaxMeasurements;
                }
            }
            if replaying && !capture.any_listening() {
                return StopReason::ReplayFinished;
            }
            if last_gauge.elapsed() >= QUEUE_GAUGE_INTERVAL {
                last_gauge = Instant::now();
                match queue.stats().await {
                    Ok(stats) => observability::record_queue_stats(&stats),
                    Err(e) => warn!(error = %e, "Failed to read queue stats"),
                }
            }
        }
    }
}
