//! Measurement - Timing Engine output
//!
//! The unit of durable record, from capture through central ingestion.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::ContractError;

/// Conversion factor from m/s to km/h
pub const MS_TO_KMH: f64 = 3.6;

/// Longest accepted `radar_id`, in characters
pub const MAX_RADAR_ID_CHARS: usize = 64;

/// Why `radar_id` would be refused, if it would be
///
/// Shared by node settings validation and central ingestion so a node never
/// starts with an id the central side rejects.
pub fn radar_id_problem(radar_id: &str) -> Option<String> {
    if radar_id.trim().is_empty() {
        return Some("must not be empty".to_string());
    }
    if radar_id.chars().count() > MAX_RADAR_ID_CHARS {
        return Some(format!("must be at most {MAX_RADAR_ID_CHARS} characters"));
    }
    None
}

/// Globally unique measurement identifier
///
/// Generated once when the measurement is created and used as the only
/// deduplication key end-to-end. Never derived from a local sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementId(Uuid);

impl MeasurementId {
    /// Fresh random (v4) identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MeasurementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for MeasurementId {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ContractError::InvalidId {
                value: s.to_string(),
                message: e.to_string(),
            })
    }
}

/// Which sensor fired first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Entering: A then B
    #[serde(rename = "A->B")]
    AToB,
    /// Exiting: B then A
    #[serde(rename = "B->A")]
    BToA,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::AToB => f.write_str("A->B"),
            Direction::BToA => f.write_str("B->A"),
        }
    }
}

/// Replication state
///
/// Monotonic: `Pending` → `Synced` only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Pending,
    Synced,
}

/// One completed, validated sensor pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Deduplication key
    pub id: MeasurementId,

    /// Originating node
    pub radar_id: String,

    /// Wall-clock time of the completing edge
    pub captured_at: DateTime<Utc>,

    /// Derived speed (km/h)
    pub speed_kmh: f64,

    /// Crossing direction
    pub direction: Direction,

    /// Speed exceeded the limit configured at capture time
    pub over_limit: bool,

    /// Replication state (only mutable field)
    #[serde(default)]
    pub sync_state: SyncState,
}

impl Measurement {
    /// Create a new Pending measurement with a fresh id
    pub fn new(
        radar_id: impl Into<String>,
        captured_at: DateTime<Utc>,
        speed_kmh: f64,
        direction: Direction,
        over_limit: bool,
    ) -> Self {
        Self {
            id: MeasurementId::new(),
            radar_id: radar_id.into(),
            captured_at,
            speed_kmh,
            direction,
            over_limit,
            sync_state: SyncState::Pending,
        }
    }

    /// Whether this record still awaits acknowledgment
    pub fn is_pending(&self) -> bool {
        self.sync_state == SyncState::Pending
    }

    /// Wire form sent to the central aggregator
    pub fn to_submission(&self, radar_name: Option<&str>) -> MeasurementSubmission {
        MeasurementSubmission {
            id: self.id,
            radar_id: self.radar_id.clone(),
            radar_name: radar_name.map(str::to_string),
            captured_at: self.captured_at,
            speed_kmh: self.speed_kmh,
            direction: self.direction,
            over_limit: self.over_limit,
        }
    }
}

/// Measurement as submitted to the central ingestion endpoint
///
/// Carries everything but the local replication state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSubmission {
    pub id: MeasurementId,
    pub radar_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radar_name: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub speed_kmh: f64,
    pub direction: Direction,
    pub over_limit: bool,
}

/// Maps monotonic capture-clock offsets to wall-clock time
///
/// Taken once at startup; wall time is never re-read on the capture path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallClockAnchor {
    /// Wall-clock time at the anchor
    pub wall: DateTime<Utc>,
    /// Monotonic offset at the anchor
    pub mono: Duration,
}

impl WallClockAnchor {
    /// Anchor `wall` to monotonic offset `mono`
    pub fn new(wall: DateTime<Utc>, mono: Duration) -> Self {
        Self { wall, mono }
    }

    /// Anchor the current wall time to monotonic zero
    pub fn now() -> Self {
        Self::new(Utc::now(), Duration::ZERO)
    }

    /// Wall-clock time of monotonic offset `at`
    pub fn wall_time(&self, at: Duration) -> DateTime<Utc> {
        if at >= self.mono {
            let delta = TimeDelta::from_std(at - self.mono).unwrap_or(TimeDelta::MAX);
            self.wall.checked_add_signed(delta).unwrap_or(self.wall)
        } else {
            let delta = TimeDelta::from_std(self.mono - at).unwrap_or(TimeDelta::MAX);
            self.wall.checked_sub_signed(delta).unwrap_or(self.wall)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = MeasurementId::new();
        let b = MeasurementId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_id_parse_roundtrip_and_error() {
        let id = MeasurementId::new();
        let parsed: MeasurementId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        let err = "not-a-uuid".parse::<MeasurementId>().unwrap_err();
        assert!(matches!(err, ContractError::InvalidId { .. }));
    }

    #[test]
    fn test_radar_id_rule_counts_characters() {
        assert!(radar_id_problem("gate-north").is_none());
        assert!(radar_id_problem("   ").is_some());

        let accented = "portão-são-joão-".repeat(4);
        assert_eq!(accented.chars().count(), 64);
        assert!(accented.len() > 64);
        assert!(radar_id_problem(&accented).is_none());

        let too_long = format!("{accented}x");
        assert!(radar_id_problem(&too_long).unwrap().contains("64"));
    }

    #[test]
    fn test_direction_wire_names() {
        assert_eq!(serde_json::to_string(&Direction::AToB).unwrap(), "\"A->B\"");
        assert_eq!(serde_json::to_string(&Direction::BToA).unwrap(), "\"B->A\"");
    }

    #[test]
    fn test_new_measurement_is_pending() {
        let m = Measurement::new("radar-1", Utc::now(), 36.0, Direction::AToB, true);
        assert!(m.is_pending());
        assert_eq!(m.sync_state, SyncState::Pending);
    }

    #[test]
    fn test_submission_omits_sync_state() {
        let m = Measurement::new("radar-1", Utc::now(), 12.5, Direction::BToA, false);
        let json = serde_json::to_value(m.to_submission(Some("Gate"))).unwrap();
        assert!(json.get("sync_state").is_none());
        assert_eq!(json["radar_name"], "Gate");
        assert_eq!(json["id"], m.id.to_string());
    }

    #[test]
    fn test_wall_clock_anchor() {
        let wall = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let anchor = WallClockAnchor::new(wall, Duration::from_secs(10));

        let later = anchor.wall_time(Duration::from_millis(10_500));
        assert_eq!(later.timestamp_millis() - wall.timestamp_millis(), 500);

        let earlier = anchor.wall_time(Duration::from_secs(9));
        assert_eq!(wall.timestamp_millis() - earlier.timestamp_millis(), 1_000);
    }
}
