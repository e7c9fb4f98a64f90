//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use contracts::MeasurementId;
use timing_engine::MIN_REPLAY_SPEED;
use std::path::PathBuf;

/// Radar Node - speed radar edge node
#[derive(Parser, Debug)]
#[command(
    name = "radar-node",
    author,
    version,
    about = "Speed radar edge node",
    long_about = "Edge node for a two-beam speed radar.\n\n\
                  Pairs sensor edges into speed measurements, records them in a \n\
                  durable local queue and forwards them to the central aggregator."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "RADAR_NODE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "RADAR_NODE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the radar node
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Show local queue state and rejected entries
    Queue(QueueArgs),

    /// Release rejected entries for redelivery
    Requeue(RequeueArgs),

    /// Rewrite the queue journal without superseded entries
    Compact(ConfigArgs),

    /// Run the central aggregator ingestion server
    Central(CentralArgs),
}

/// Shared `--config` argument
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "radar.toml",
        env = "RADAR_NODE_CONFIG"
    )]
    pub config: PathBuf,
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Generate crossings instead of reading sensors (default without --replay)
    #[arg(long, conflicts_with = "replay")]
    pub simulate: bool,

    /// Replay recorded sensor edges from a JSONL file
    #[arg(long, env = "RADAR_NODE_REPLAY")]
    pub replay: Option<PathBuf>,

    /// Replay pacing multiplier (1.0 = recorded pace, faster only)
    #[arg(long, default_value = "1.0", requires = "replay", value_parser = parse_replay_speed)]
    pub replay_speed: f64,

    /// Stop after this many recorded measurements (0 = unlimited)
    #[arg(long, default_value = "0", env = "RADAR_NODE_MAX_MEASUREMENTS")]
    pub max_measurements: u64,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "RADAR_NODE_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "RADAR_NODE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `queue` command
#[derive(Parser, Debug)]
pub struct QueueArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `requeue` command
#[derive(Parser, Debug)]
pub struct RequeueArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Release a single measurement
    #[arg(long, conflicts_with = "all_rejected", required_unless_present = "all_rejected")]
    pub id: Option<MeasurementId>,

    /// Release every rejected measurement
    #[arg(long)]
    pub all_rejected: bool,
}

/// Arguments for the `central` command
#[derive(Parser, Debug)]
pub struct CentralArgs {
    /// Path to central configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "central.toml",
        env = "RADAR_CENTRAL_CONFIG"
    )]
    pub config: PathBuf,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "RADAR_CENTRAL_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

impl Commands {
    /// Subcommand name, for the startup log line
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Run(_) => "run",
            Commands::Validate(_) => "validate",
            Commands::Info(_) => "info",
            Commands::Queue(_) => "queue",
            Commands::Requeue(_) => "requeue",
            Commands::Compact(_) => "compact",
            Commands::Central(_) => "central",
        }
    }
}

fn parse_replay_speed(raw: &str) -> Result<f64, String> {
    let speed: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if !speed.is_finite() || speed < MIN_REPLAY_SPEED {
        return Err(format!(
            "must be a finite number >= {MIN_REPLAY_SPEED} (replay can only be sped up)"
        ));
    }
    Ok(speed)
}
