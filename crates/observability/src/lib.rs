//! # Observability
//!
//! Logging and Prometheus metrics for the radar node and the central
//! aggregator.
//!
//! ```ignore
//! observability::init_tracing(&LogSettings::for_verbosity(LogFormat::Compact, 1, false))?;
//! observability::install_prometheus(9000)?;
//!
//! if let Some(measurement) = engine.push(edge) {
//!     observability::record_measurement(&measurement);
//! }
//! ```

pub mod metrics;

use anyhow::{anyhow, Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    direction_label, outcome_label, record_capture_discard, record_delivery_latency_ms,
    record_edge_dropped, record_edge_received, record_handoff_dropped, record_ingest,
    record_measurement,
    record_persist_failure, record_queue_stats, record_sync_cycle, record_sync_health,
    RunningStats, SpeedAggregator, SpeedSummary, StatsSummary,
};

/// Log line layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers
    Json,
    /// Multi-line, for interactive debugging
    Pretty,
    /// One line per event
    #[default]
    Compact,
}

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset
    pub default_directive: String,
    /// Ignore `RUST_LOG` and use `default_directive`
    pub force_directive: bool,
}

impl LogSettings {
    /// Map `-v` counts and `--quiet` to a filter
    ///
    /// `--quiet` pins the level to `warn` regardless of `RUST_LOG`.
    pub fn for_verbosity(format: LogFormat, verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        Self {
            format,
            default_directive: level.to_string(),
            force_directive: quiet,
        }
    }

    fn filter(&self) -> EnvFilter {
        if self.force_directive {
            return EnvFilter::new(&self.default_directive);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self::for_verbosity(LogFormat::default(), 0, false)
    }
}

/// Install the global tracing subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(settings: &LogSettings) -> Result<()> {
    let layer = match settings.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(settings.filter())
        .with(layer)
        .try_init()
        .map_err(|e| anyhow!("tracing subscriber already installed: {e}"))
}

/// Serve Prometheus metrics on `0.0.0.0:<port>`
///
/// Installs the global `metrics` recorder; call at most once per process.
pub fn install_prometheus(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to start Prometheus exporter on port {port}"))?;

    tracing::info!(port, "Prometheus metrics endpoint listening");
    Ok(())
}
