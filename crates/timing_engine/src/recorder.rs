//! Recorder - persists handed-off measurements to the local queue

use std::sync::Arc;

use contracts::Measurement;
use local_queue::SharedQueue;
use observability::SpeedAggregator;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::metrics::CaptureMetrics;

/// What the recorder did over its lifetime
#[derive(Debug, Clone, Default)]
pub struct RecorderReport {
    pub persisted: u64,
    pub failures: u64,
    /// Speeds of persisted measurements
    pub speeds: SpeedAggregator,
}

/// Handle to the running recorder worker
pub struct Recorder {
    worker: JoinHandle<RecorderReport>,
}

impl Recorder {
    /// Spawn the worker; it runs until every handoff sender is dropped
    pub fn spawn(
        queue: SharedQueue,
        rx: mpsc::Receiver<Measurement>,
        metrics: Arc<CaptureMetrics>,
    ) -> Self {
        let worker = tokio::spawn(recorder_worker(queue, rx, metrics));
        Self { worker }
    }

    /// Wait for the handoff to drain and the worker to exit
    pub async fn join(self) -> RecorderReport {
        match self.worker.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = ?e, "Recorder task panicked");
                RecorderReport::default()
            }
        }
    }
}

#[instrument(name = "recorder_worker", skip_all)]
async fn recorder_worker(
    queue: SharedQueue,
    mut rx: mpsc::Receiver<Measurement>,
    metrics: Arc<CaptureMetrics>,
) -> RecorderReport {
    debug!("Recorder started");
    let mut report = RecorderReport::default();

    while let Some(measurement) = rx.recv().await {
        let id = measurement.id;
        match queue.append(measurement.clone()).await {
            Ok(()) => {
                metrics.inc_persisted();
                report.persisted += 1;
                report.speeds.update(&measurement);
                debug!(measurement_id = %id, "Measurement persisted");
            }
            Err(e) => {
                // The sample is lost; capture carries on
                metrics.inc_persist_failures();
                observability::record_persist_failure();
                report.failures += 1;
                error!(measurement_id = %id, error = %e, "Failed to persist measurement");
            }
        }
    }

    debug!(persisted = report.persisted, failures = report.failures, "Recorder stopped");
    report
}
