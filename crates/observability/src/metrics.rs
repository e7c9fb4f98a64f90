//! Radar node metrics
//!
//! Thin wrappers over the `metrics` facade plus in-memory aggregators used
//! for the run summary. All metric names carry the `radar_` prefix.

use contracts::{CycleOutcome, CycleReport, Direction, Measurement, QueueStats};
use metrics::{counter, gauge, histogram};
use std::collections::HashMap;

/// Record an emitted measurement
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_measurement;
///
/// if let Some(measurement) = engine.push(edge) {
///     record_measurement(&measurement);
/// }
/// ```
pub fn record_measurement(measurement: &Measurement) {
    counter!(
        "radar_measurements_total",
        "direction" => direction_label(measurement.direction),
        "over_limit" => if measurement.over_limit { "true" } else { "false" }
    )
    .increment(1);

    histogram!("radar_speed_kmh").record(measurement.speed_kmh);
    gauge!("radar_last_speed_kmh").set(measurement.speed_kmh);
}

/// Record a sensor edge entering the capture path
pub fn record_edge_received(channel: &str) {
    counter!("radar_edges_received_total", "channel" => channel.to_string()).increment(1);
}

/// Record a sensor edge dropped because the edge channel was full
pub fn record_edge_dropped() {
    counter!("radar_edges_dropped_total").increment(1);
}

/// Record a pairing discarded by the timing engine
///
/// `reason` is one of `expired`, `out_of_range`, `non_positive`.
pub fn record_capture_discard(reason: &'static str) {
    counter!("radar_capture_discarded_total", "reason" => reason).increment(1);
}

/// Record a measurement dropped at the recorder handoff
pub fn record_handoff_dropped() {
    counter!("radar_handoff_dropped_total").increment(1);
}

/// Record a measurement lost because the local append failed
pub fn record_persist_failure() {
    counter!("radar_persist_failures_total").increment(1);
}

/// Record local queue occupancy
pub fn record_queue_stats(stats: &QueueStats) {
    gauge!("radar_queue_total").set(stats.total as f64);
    gauge!("radar_queue_pending").set(stats.pending as f64);
    gauge!("radar_queue_synced").set(stats.synced as f64);
    gauge!("radar_queue_rejected").set(stats.rejected as f64);
}

/// Record the result of one sync cycle
pub fn record_sync_cycle(report: &CycleReport) {
    counter!("radar_sync_cycles_total", "outcome" => outcome_label(report.outcome)).increment(1);

    counter!("radar_sync_entries_total", "result" => "accepted").increment(report.accepted as u64);
    counter!("radar_sync_entries_total", "result" => "duplicate")
        .increment(report.duplicates as u64);
    counter!("radar_sync_entries_total", "result" => "rejected").increment(report.rejected as u64);
    counter!("radar_sync_entries_total", "result" => "failed").increment(report.failed as u64);

    if let (Some(started), Some(finished)) = (report.started_at, report.finished_at) {
        let elapsed_ms = (finished - started).num_milliseconds().max(0);
        histogram!("radar_sync_cycle_ms").record(elapsed_ms as f64);
    }
}

/// Record the round-trip time of one delivery attempt
pub fn record_delivery_latency_ms(latency_ms: f64) {
    histogram!("radar_sync_delivery_ms").record(latency_ms);
}

/// Record consecutive failed cycles and whether delivery is halted
pub fn record_sync_health(consecutive_failures: u32, halted: bool) {
    gauge!("radar_sync_consecutive_failures").set(consecutive_failures as f64);
    gauge!("radar_sync_halted").set(if halted { 1.0 } else { 0.0 });
}

/// Record one central-side ingestion outcome
pub fn record_ingest(status: &'static str) {
    counter!("radar_central_ingest_total", "status" => status).increment(1);
}

pub fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::AToB => "a_to_b",
        Direction::BToA => "b_to_a",
    }
}

pub fn outcome_label(outcome: CycleOutcome) -> &'static str {
    match outcome {
        CycleOutcome::Idle => "idle",
        CycleOutcome::Completed => "completed",
        CycleOutcome::TransportFailure => "transport_failure",
        CycleOutcome::AuthRejected => "auth_rejected",
        CycleOutcome::Interrupted => "interrupted",
        CycleOutcome::Skipped => "skipped",
        CycleOutcome::QueueError => "queue_error",
    }
}

/// Speed aggregator
///
/// Aggregates recorded measurements in memory for the end-of-run summary.
#[derive(Debug, Clone, Default)]
pub struct SpeedAggregator {
    /// Measurements seen
    pub total: u64,

    /// Measurements flagged over the limit
    pub over_limit: u64,

    /// Per-direction counts
    pub by_direction: HashMap<Direction, u64>,

    /// Speed statistics (km/h)
    pub speed_stats: RunningStats,
}

impl SpeedAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, measurement: &Measurement) {
        self.total += 1;
        if measurement.over_limit {
            self.over_limit += 1;
        }
        *self.by_direction.entry(measurement.direction).or_insert(0) += 1;
        self.speed_stats.push(measurement.speed_kmh);
    }

    pub fn summary(&self) -> SpeedSummary {
        SpeedSummary {
            total: self.total,
            over_limit: self.over_limit,
            over_limit_rate: if self.total > 0 {
                self.over_limit as f64 / self.total as f64 * 100.0
            } else {
                0.0
            },
            a_to_b: self.by_direction.get(&Direction::AToB).copied().unwrap_or(0),
            b_to_a: self.by_direction.get(&Direction::BToA).copied().unwrap_or(0),
            speed_kmh: StatsSummary::from(&self.speed_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Speed summary
#[derive(Debug, Clone, Default)]
pub struct SpeedSummary {
    pub total: u64,
    pub over_limit: u64,
    pub over_limit_rate: f64,
    pub a_to_b: u64,
    pub b_to_a: u64,
    pub speed_kmh: StatsSummary,
}

impl std::fmt::Display for SpeedSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Speed Summary ===")?;
        writeln!(f, "Measurements: {}", self.total)?;
        writeln!(
            f,
            "Over limit: {} ({:.2}%)",
            self.over_limit, self.over_limit_rate
        )?;
        writeln!(f, "Direction A->B: {}, B->A: {}", self.a_to_b, self.b_to_a)?;
        writeln!(f, "Speed (km/h): {}", self.speed_kmh)?;
        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.2}, max={:.2}, mean={:.2}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
