//! NodeSettings - Config Loader output
//!
//! Immutable settings loaded once at startup and passed explicitly into every
//! component. Applying new settings means restarting the process.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::TriggerEdge;

/// Settings version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SettingsVersion {
    #[default]
    V1,
}

/// Complete node settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NodeSettings {
    /// Settings version
    #[serde(default)]
    pub version: SettingsVersion,

    /// Node identity and credentials
    #[validate(nested)]
    pub node: NodeIdentity,

    /// Sensor geometry and thresholds
    #[validate(nested)]
    pub sensors: SensorSettings,

    /// Capture path channel sizing
    #[serde(default)]
    #[validate(nested)]
    pub capture: CaptureSettings,

    /// Local durable queue location
    #[serde(default)]
    pub storage: StorageSettings,

    /// Replication toward the central aggregator
    #[serde(default)]
    #[validate(nested)]
    pub sync: SyncSettings,

    /// Management API
    #[serde(default)]
    pub api: ApiSettings,
}

/// Node identity
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NodeIdentity {
    /// Stable node identifier, stamped on every measurement
    #[validate(length(min = 1, max = 64, message = "radar_id must be 1-64 characters"))]
    pub radar_id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Installation location
    #[serde(default)]
    pub location: Option<String>,

    /// Bearer token required by the management API
    #[validate(length(min = 1, message = "api_token cannot be empty"))]
    pub api_token: String,
}

/// Sensor geometry and thresholds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorSettings {
    /// GPIO pin of sensor A (BCM numbering)
    #[serde(default = "default_a_pin")]
    #[validate(range(max = 40, message = "a_pin must be a GPIO number <= 40"))]
    pub a_pin: u8,

    /// GPIO pin of sensor B (BCM numbering)
    #[serde(default = "default_b_pin")]
    #[validate(range(max = 40, message = "b_pin must be a GPIO number <= 40"))]
    pub b_pin: u8,

    /// Distance between the two beams (meters)
    #[serde(default = "default_distance_m")]
    #[validate(range(exclusive_min = 0.0, message = "distance_m must be greater than zero"))]
    pub distance_m: f64,

    /// Speed above which a measurement is flagged over-limit (km/h)
    #[serde(default = "default_speed_limit")]
    #[validate(range(exclusive_min = 0.0, message = "speed_limit_kmh must be greater than zero"))]
    pub speed_limit_kmh: f64,

    /// Sanity ceiling; faster readings are discarded as glitches (km/h)
    #[serde(default = "default_max_speed")]
    #[validate(range(exclusive_min = 0.0, message = "max_speed_kmh must be greater than zero"))]
    pub max_speed_kmh: f64,

    /// How long an armed edge waits for its pair (milliseconds)
    #[serde(default = "default_pairing_timeout_ms")]
    #[validate(range(
        min = 100,
        max = 60000,
        message = "pairing_timeout_ms must be within 100..=60000"
    ))]
    pub pairing_timeout_ms: u64,

    /// Which transitions count as a crossing
    #[serde(default)]
    pub trigger_edge: TriggerEdge,
}

impl SensorSettings {
    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_millis(self.pairing_timeout_ms)
    }
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            a_pin: default_a_pin(),
            b_pin: default_b_pin(),
            distance_m: default_distance_m(),
            speed_limit_kmh: default_speed_limit(),
            max_speed_kmh: default_max_speed(),
            pairing_timeout_ms: default_pairing_timeout_ms(),
            trigger_edge: TriggerEdge::default(),
        }
    }
}

fn default_a_pin() -> u8 {
    17
}

fn default_b_pin() -> u8 {
    27
}

fn default_distance_m() -> f64 {
    1.0
}

fn default_speed_limit() -> f64 {
    20.0
}

fn default_max_speed() -> f64 {
    200.0
}

fn default_pairing_timeout_ms() -> u64 {
    10_000
}

/// Capture path channel sizing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CaptureSettings {
    /// Bounded edge channel between sources and the timing engine
    #[serde(default = "default_edge_capacity")]
    #[validate(range(min = 1, message = "edge_channel_capacity must be >= 1"))]
    pub edge_channel_capacity: usize,

    /// Bounded measurement handoff between the timing engine and the recorder
    #[serde(default = "default_handoff_capacity")]
    #[validate(range(min = 1, message = "handoff_capacity must be >= 1"))]
    pub handoff_capacity: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            edge_channel_capacity: default_edge_capacity(),
            handoff_capacity: default_handoff_capacity(),
        }
    }
}

fn default_edge_capacity() -> usize {
    256
}

fn default_handoff_capacity() -> usize {
    64
}

/// Local durable queue location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Journal file path
    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,

    /// Rewrite the journal compactly when the node starts
    #[serde(default = "default_true")]
    pub compact_on_start: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            queue_path: default_queue_path(),
            compact_on_start: true,
        }
    }
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("/var/lib/radar/queue.journal")
}

fn default_true() -> bool {
    true
}

/// Replication settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SyncSettings {
    /// Central ingestion endpoint (None = delivery disabled, records stay Pending)
    #[serde(default)]
    #[validate(url(message = "central_url must be a valid URL"))]
    pub central_url: Option<String>,

    /// Bearer token presented to the central aggregator
    #[serde(default)]
    pub central_token: Option<String>,

    /// Cycle interval (seconds)
    #[serde(default = "default_interval_secs")]
    #[validate(range(min = 1, message = "interval_secs must be >= 1"))]
    pub interval_secs: u64,

    /// Per-attempt timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, message = "request_timeout_secs must be >= 1"))]
    pub request_timeout_secs: u64,

    /// Maximum entries attempted per cycle
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, message = "batch_size must be >= 1"))]
    pub batch_size: usize,
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_enabled(&self) -> bool {
        self.central_url.is_some()
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            central_url: None,
            central_token: None,
            interval_secs: default_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_batch_size() -> usize {
    100
}

/// Management API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            listen: default_api_listen(),
        }
    }
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

/// Central aggregator settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CentralSettings {
    /// Listen address of the ingestion server
    #[serde(default = "default_central_listen")]
    pub listen: SocketAddr,

    /// Bearer token nodes must present
    #[validate(length(min = 1, message = "api_token cannot be empty"))]
    pub api_token: String,

    /// Durable record store (None = in-memory)
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

fn default_central_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8090))
}
