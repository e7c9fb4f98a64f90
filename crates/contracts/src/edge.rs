//! SensorEdge - Edge source output
//!
//! A single transition observed on one of the two beam sensors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Logical sensor channel
///
/// The installation places sensor A first in the nominal direction of
/// travel and sensor B `distance_m` further along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    /// The opposite sensor
    pub fn other(self) -> Self {
        match self {
            Channel::A => Channel::B,
            Channel::B => Channel::A,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::A => f.write_str("A"),
            Channel::B => f.write_str("B"),
        }
    }
}

/// Signal transition direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Rising,
    Falling,
}

/// Which transitions count as a crossing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEdge {
    /// Beam interrupted pulls the line low (IR break-beam default)
    #[default]
    Falling,
    Rising,
    Both,
}

impl TriggerEdge {
    /// Whether an edge of `kind` is a crossing under this policy
    pub fn accepts(self, kind: EdgeKind) -> bool {
        match self {
            TriggerEdge::Falling => kind == EdgeKind::Falling,
            TriggerEdge::Rising => kind == EdgeKind::Rising,
            TriggerEdge::Both => true,
        }
    }
}

/// A timestamped transition on one sensor channel
///
/// Ephemeral: edges are never persisted individually.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorEdge {
    /// Channel that fired
    pub channel: Channel,

    /// Monotonic capture-clock offset
    #[serde(with = "duration_nanos")]
    pub at: Duration,

    /// Transition direction
    pub kind: EdgeKind,
}

impl SensorEdge {
    /// Falling edge on `channel` at `at`
    pub fn falling(channel: Channel, at: Duration) -> Self {
        Self {
            channel,
            at,
            kind: EdgeKind::Falling,
        }
    }

    /// Rising edge on `channel` at `at`
    pub fn rising(channel: Channel, at: Duration) -> Self {
        Self {
            channel,
            at,
            kind: EdgeKind::Rising,
        }
    }
}

/// Edges are recorded as integer nanoseconds (`at_ns`) on the wire.
mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}
