//! CaptureLoop - single task driving the timing engine
//!
//! Consumes the bounded edge channel, runs expiry on a timer and hands
//! emitted measurements to the recorder without ever awaiting it.

use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use contracts::{Measurement, SensorEdge};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::CaptureClock;
use crate::engine::{TimingEngine, TimingStats};
use crate::metrics::CaptureMetrics;

/// Floor for the expiry timer period
const MIN_EXPIRY_TICK: Duration = Duration::from_millis(10);

pub struct CaptureLoop {
    engine: TimingEngine,
    clock: CaptureClock,
    edges: Receiver<SensorEdge>,
    handoff: mpsc::Sender<Measurement>,
    metrics: Arc<CaptureMetrics>,
    expiry_tick: Duration,
}

impl CaptureLoop {
    pub fn new(
        engine: TimingEngine,
        clock: CaptureClock,
        edges: Receiver<SensorEdge>,
        handoff: mpsc::Sender<Measurement>,
        metrics: Arc<CaptureMetrics>,
    ) -> Self {
        let expiry_tick = (engine.config().pairing_timeout / 4).max(MIN_EXPIRY_TICK);
        Self {
            engine,
            clock,
            edges,
            handoff,
            metrics,
            expiry_tick,
        }
    }

    /// Run until the edge channel closes or shutdown is signaled
    ///
    /// Edges already queued when the channel closes are still processed.
    #[instrument(name = "capture_loop", skip_all)]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> TimingStats {
        let mut ticker = tokio::time::interval(self.expiry_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(expiry_tick_ms = self.expiry_tick.as_millis() as u64, "Capture loop started");

        loop {
            tokio::select! {
                edge = self.edges.recv() => match edge {
                    Ok(edge) => self.handle_edge(edge),
                    Err(_) => {
                        debug!("Edge channel closed");
                        break;
                    }
                },
                _ = ticker.tick() => self.handle_tick(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Capture loop shutdown requested");
                        break;
                    }
                }
            }
        }

        while let Ok(edge) = self.edges.try_recv() {
            self.handle_edge(edge);
        }

        let stats = self.engine.stats();
        self.metrics.update_timing(stats);
        info!(
            emitted = stats.emitted,
            expired = stats.expired,
            out_of_range = stats.out_of_range,
            "Capture loop stopped"
        );
        stats
    }

    fn handle_edge(&mut self, edge: SensorEdge) {
        let before = self.engine.stats();
        let emitted = self.engine.push(edge);
        let after = self.engine.stats();
        record_discards(&before, &after);
        self.metrics.update_timing(after);

        if let Some(measurement) = emitted {
            self.hand_off(measurement);
        }
    }

    fn handle_tick(&mut self) {
        if self.engine.expire(self.clock.now()) {
            observability::record_capture_discard("expired");
            self.metrics.update_timing(self.engine.stats());
        }
    }

    fn hand_off(&self, measurement: Measurement) {
        observability::record_measurement(&measurement);
        info!(
            measurement_id = %measurement.id,
            speed_kmh = measurement.speed_kmh,
            direction = %measurement.direction,
            over_limit = measurement.over_limit,
            "Measurement captured"
        );

        match self.handoff.try_send(measurement) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(m)) => {
                self.metrics.inc_handoff_dropped();
                observability::record_handoff_dropped();
                warn!(measurement_id = %m.id, "Recorder handoff full, measurement dropped");
            }
            Err(mpsc::error::TrySendError::Closed(m)) => {
                self.metrics.inc_handoff_dropped();
                observability::record_handoff_dropped();
                error!(measurement_id = %m.id, "Recorder handoff closed, measurement dropped");
            }
        }
    }
}

fn record_discards(before: &TimingStats, after: &TimingStats) {
    if after.expired > before.expired {
        observability::record_capture_discard("expired");
    }
    if after.out_of_range > before.out_of_range {
        observability::record_capture_discard("out_of_range");
    }
    if after.non_positive > before.non_positive {
        observability::record_capture_discard("non_positive");
    }
}
