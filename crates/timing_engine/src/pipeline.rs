//! CapturePipeline - wires edge sources through to the local queue
//!
//! sources → bounded edge channel → capture loop → bounded handoff → recorder

use std::sync::Arc;

use async_channel::{bounded, Sender};
use contracts::{EdgeSource, NodeSettings, SensorEdge};
use local_queue::SharedQueue;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::capture::CaptureLoop;
use crate::clock::CaptureClock;
use crate::engine::{TimingConfig, TimingEngine, TimingStats};
use crate::intake::edge_callback;
use crate::metrics::CaptureMetrics;
use crate::recorder::{Recorder, RecorderReport};

/// Final report of a capture run
#[derive(Debug, Clone, Default)]
pub struct CaptureReport {
    pub timing: TimingStats,
    pub recorder: RecorderReport,
    pub edges_dropped: u64,
    pub handoff_dropped: u64,
}

/// Running capture path
pub struct CapturePipeline {
    sources: Vec<Box<dyn EdgeSource>>,
    edge_tx: Sender<SensorEdge>,
    metrics: Arc<CaptureMetrics>,
    clock: CaptureClock,
    capture: JoinHandle<TimingStats>,
    recorder: Recorder,
}

impl CapturePipeline {
    /// Spawn the capture loop and recorder
    ///
    /// Sources are registered afterwards and started with [`start_all`].
    ///
    /// [`start_all`]: CapturePipeline::start_all
    pub fn start(
        settings: &NodeSettings,
        clock: CaptureClock,
        queue: SharedQueue,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let metrics = Arc::new(CaptureMetrics::new());
        let (edge_tx, edge_rx) = bounded(settings.capture.edge_channel_capacity);
        let (handoff_tx, handoff_rx) = mpsc::channel(settings.capture.handoff_capacity);

        let engine = TimingEngine::new(
            TimingConfig::from_settings(settings.node.radar_id.clone(), &settings.sensors),
            clock.anchor(),
        );
        let capture = CaptureLoop::new(engine, clock, edge_rx, handoff_tx, Arc::clone(&metrics));
        let capture = tokio::spawn(capture.run(shutdown));
        let recorder = Recorder::spawn(queue, handoff_rx, Arc::clone(&metrics));

        info!(
            radar_id = %settings.node.radar_id,
            distance_m = settings.sensors.distance_m,
            speed_limit_kmh = settings.sensors.speed_limit_kmh,
            trigger_edge = ?settings.sensors.trigger_edge,
            "Capture pipeline started"
        );

        Self {
            sources: Vec::new(),
            edge_tx,
            metrics,
            clock,
            capture,
            recorder,
        }
    }

    /// Register an edge source (not started)
    pub fn register_source(&mut self, source: Box<dyn EdgeSource>) {
        debug!(source = %source.name(), "Registered edge source");
        self.sources.push(source);
    }

    #[instrument(name = "capture_start_all", skip(self))]
    pub fn start_all(&self) {
        for source in &self.sources {
            if !source.is_listening() {
                debug!(source = %source.name(), "Starting edge source");
                source.listen(edge_callback(self.edge_tx.clone(), Arc::clone(&self.metrics)));
            }
        }
    }

    #[instrument(name = "capture_stop_all", skip(self))]
    pub fn stop_all(&self) {
        for source in &self.sources {
            debug!(source = %source.name(), "Stopping edge source");
            source.stop();
        }
    }

    /// True while any registered source is still producing
    pub fn any_listening(&self) -> bool {
        self.sources.iter().any(|s| s.is_listening())
    }

    /// Edge sender for feeding edges directly
    pub fn edge_sender(&self) -> Sender<SensorEdge> {
        self.edge_tx.clone()
    }

    pub fn metrics(&self) -> Arc<CaptureMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn clock(&self) -> CaptureClock {
        self.clock
    }

    /// Stop sources, drain the capture path and wait for the recorder
    #[instrument(name = "capture_shutdown", skip(self))]
    pub async fn shutdown(self) -> CaptureReport {
        self.stop_all();
        self.edge_tx.close();

        let timing = match self.capture.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = ?e, "Capture task panicked");
                TimingStats::default()
            }
        };
        let recorder = self.recorder.join().await;

        let report = CaptureReport {
            timing,
            recorder,
            edges_dropped: self.metrics.edges_dropped(),
            handoff_dropped: self.metrics.handoff_dropped(),
        };
        info!(
            emitted = report.timing.emitted,
            persisted = report.recorder.persisted,
            persist_failures = report.recorder.failures,
            edges_dropped = report.edges_dropped,
            "Capture pipeline stopped"
        );
        report
    }
}
