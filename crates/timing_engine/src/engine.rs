//! TimingEngine - edge-pairing state machine
//!
//! Holds at most one armed edge. The next qualifying edge on the other
//! channel completes the pair; elapsed monotonic time between the two edges
//! gives the speed over the configured beam distance.
//!
//! All arithmetic uses the monotonic edge timestamps. Wall-clock time is
//! only consulted to stamp `captured_at` on an emitted measurement.

use std::time::Duration;

use contracts::{
    Channel, Direction, Measurement, SensorEdge, SensorSettings, TriggerEdge, WallClockAnchor,
    MS_TO_KMH,
};
use serde::Serialize;
use tracing::{debug, trace};

/// Timing parameters, fixed for the life of the engine
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Stamped on every measurement
    pub radar_id: String,
    /// Beam separation (meters)
    pub distance_m: f64,
    /// Over-limit threshold (km/h)
    pub speed_limit_kmh: f64,
    /// Sanity ceiling (km/h)
    pub max_speed_kmh: f64,
    /// How long an armed edge waits for its pair
    pub pairing_timeout: Duration,
    /// Which transitions count as crossings
    pub trigger_edge: TriggerEdge,
}

impl TimingConfig {
    pub fn from_settings(radar_id: impl Into<String>, sensors: &SensorSettings) -> Self {
        Self {
            radar_id: radar_id.into(),
            distance_m: sensors.distance_m,
            speed_limit_kmh: sensors.speed_limit_kmh,
            max_speed_kmh: sensors.max_speed_kmh,
            pairing_timeout: sensors.pairing_timeout(),
            trigger_edge: sensors.trigger_edge,
        }
    }
}

/// Engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimingStats {
    /// Measurements emitted
    pub emitted: u64,
    /// Armed edges that never found a pair
    pub expired: u64,
    /// Repeated edges on the armed channel
    pub debounced: u64,
    /// Pairs faster than the ceiling (or non-finite)
    pub out_of_range: u64,
    /// Pairs whose second edge was not later than the first
    pub non_positive: u64,
    /// Edges of the wrong kind for the trigger policy
    pub ignored_edges: u64,
}

/// The single armed edge
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingWindow {
    channel: Channel,
    at: Duration,
}

/// Edge-pairing state machine
///
/// Owned by exactly one task; not shared.
pub struct TimingEngine {
    config: TimingConfig,
    anchor: WallClockAnchor,
    window: Option<PendingWindow>,
    stats: TimingStats,
}

impl TimingEngine {
    pub fn new(config: TimingConfig, anchor: WallClockAnchor) -> Self {
        Self {
            config,
            anchor,
            window: None,
            stats: TimingStats::default(),
        }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Feed one edge; returns a measurement when it completes a valid pair
    pub fn push(&mut self, edge: SensorEdge) -> Option<Measurement> {
        if !self.config.trigger_edge.accepts(edge.kind) {
            self.stats.ignored_edges += 1;
            trace!(channel = %edge.channel, kind = ?edge.kind, "Edge ignored by trigger policy");
            return None;
        }

        // Lazy expiry: an armed edge older than the window never pairs
        if let Some(window) = self.window {
            if edge.at.saturating_sub(window.at) > self.config.pairing_timeout {
                self.expire_window(window);
            }
        }

        match self.window {
            None => {
                self.window = Some(PendingWindow {
                    channel: edge.channel,
                    at: edge.at,
                });
                trace!(channel = %edge.channel, at_ns = edge.at.as_nanos() as u64, "Armed");
                None
            }
            Some(ref mut window) if window.channel == edge.channel => {
                window.at = edge.at;
                self.stats.debounced += 1;
                trace!(channel = %edge.channel, "Debounced repeated edge");
                None
            }
            Some(window) => {
                self.window = None;
                self.complete(window, edge)
            }
        }
    }

    /// Timer-driven expiry against monotonic `now`
    ///
    /// Returns true if an armed edge was discarded.
    pub fn expire(&mut self, now: Duration) -> bool {
        match self.window {
            Some(window) if now.saturating_sub(window.at) > self.config.pairing_timeout => {
                self.expire_window(window);
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.window.is_some()
    }

    /// Channel currently armed, if any
    pub fn armed_channel(&self) -> Option<Channel> {
        self.window.map(|w| w.channel)
    }

    pub fn stats(&self) -> TimingStats {
        self.stats
    }

    fn expire_window(&mut self, window: PendingWindow) {
        self.window = None;
        self.stats.expired += 1;
        debug!(channel = %window.channel, "Armed edge expired without a pair");
    }

    fn complete(&mut self, first: PendingWindow, second: SensorEdge) -> Option<Measurement> {
        let elapsed = match second.at.checked_sub(first.at) {
            Some(elapsed) if !elapsed.is_zero() => elapsed,
            _ => {
                self.stats.non_positive += 1;
                debug!(
                    first = %first.channel,
                    second = %second.channel,
                    "Pair discarded: second edge not after first"
                );
                return None;
            }
        };

        let speed_kmh = self.config.distance_m / elapsed.as_secs_f64() * MS_TO_KMH;
        if !speed_kmh.is_finite() || speed_kmh < 0.0 || speed_kmh > self.config.max_speed_kmh {
            self.stats.out_of_range += 1;
            debug!(
                speed_kmh,
                elapsed_us = elapsed.as_micros() as u64,
                max_speed_kmh = self.config.max_speed_kmh,
                "Pair discarded: speed out of range"
            );
            return None;
        }

        let direction = match first.channel {
            Channel::A => Direction::AToB,
            Channel::B => Direction::BToA,
        };
        let over_limit = speed_kmh > self.config.speed_limit_kmh;
        let captured_at = self.anchor.wall_time(second.at);

        self.stats.emitted += 1;
        Some(Measurement::new(
            self.config.radar_id.clone(),
            captured_at,
            speed_kmh,
            direction,
            over_limit,
        ))
    }
}
