//! Simulated edge source
//!
//! Generates vehicle crossings at random speeds on a background thread, for
//! running the node without sensor hardware attached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contracts::{Channel, EdgeCallback, EdgeSource, SensorEdge, MS_TO_KMH};
use rand::Rng;
use tracing::{debug, trace, warn};

use crate::clock::CaptureClock;

/// Sleep granularity so `stop` is honored promptly
const STOP_POLL: Duration = Duration::from_millis(50);

/// Simulation settings
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Beam separation used to derive edge spacing (meters)
    pub distance_m: f64,
    /// Vehicle speed range (km/h)
    pub min_speed_kmh: f64,
    pub max_speed_kmh: f64,
    /// Quiet time between vehicles
    pub min_gap: Duration,
    pub max_gap: Duration,
    /// Share of crossings travelling B→A
    pub reverse_ratio: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            distance_m: 1.0,
            min_speed_kmh: 5.0,
            max_speed_kmh: 45.0,
            min_gap: Duration::from_secs(3),
            max_gap: Duration::from_secs(15),
            reverse_ratio: 0.1,
        }
    }
}

pub struct SimulatedEdgeSource {
    name: String,
    clock: CaptureClock,
    config: SimulationConfig,
    listening: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedEdgeSource {
    pub fn new(clock: CaptureClock, config: SimulationConfig) -> Self {
        Self {
            name: "simulated".to_string(),
            clock,
            config,
            listening: Arc::new(AtomicBool::new(false)),
            thread_handle: Mutex::new(None),
        }
    }

    /// Edge pair for one crossing starting at `at`
    fn crossing(
        config: &SimulationConfig,
        at: Duration,
        speed_kmh: f64,
        reverse: bool,
    ) -> (SensorEdge, SensorEdge) {
        let elapsed = Duration::from_secs_f64(config.distance_m / (speed_kmh / MS_TO_KMH));
        let first = if reverse { Channel::B } else { Channel::A };
        (
            SensorEdge::falling(first, at),
            SensorEdge::falling(first.other(), at + elapsed),
        )
    }
}

impl EdgeSource for SimulatedEdgeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, callback: EdgeCallback) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let listening = Arc::clone(&self.listening);
        let clock = self.clock;
        let config = self.config.clone();
        let name = self.name.clone();

        let handle = thread::spawn(move || {
            debug!(source = %name, "Simulation started");
            let mut rng = rand::rng();

            while listening.load(Ordering::Relaxed) {
                let gap = if config.max_gap > config.min_gap {
                    rng.random_range(config.min_gap..=config.max_gap)
                } else {
                    config.min_gap
                };
                if !sleep_while(&listening, gap) {
                    break;
                }

                let speed_kmh = if config.max_speed_kmh > config.min_speed_kmh {
                    rng.random_range(config.min_speed_kmh..config.max_speed_kmh)
                } else {
                    config.min_speed_kmh
                };
                let reverse = rng.random_bool(config.reverse_ratio.clamp(0.0, 1.0));

                let (first, second) = Self::crossing(&config, clock.now(), speed_kmh, reverse);
                callback(first);
                if !sleep_while(&listening, second.at.saturating_sub(first.at)) {
                    break;
                }
                callback(second);

                trace!(source = %name, speed_kmh, reverse, "Simulated crossing");
            }

            debug!(source = %name, "Simulation stopped");
        });

        match self.thread_handle.lock() {
            Ok(mut guard) => *guard = Some(handle),
            Err(_) => warn!(source = %self.name, "Thread handle lock poisoned"),
        }
    }

    fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);

        let handle = self.thread_handle.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}

/// Sleep for `total` in short slices; false if listening was cleared
fn sleep_while(listening: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if !listening.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(STOP_POLL);
        thread::sleep(slice);
        remaining -= slice;
    }
    listening.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn test_crossing_spacing() {
        let config = SimulationConfig::default();
        let (a, b) = SimulatedEdgeSource::crossing(&config, Duration::from_secs(1), 36.0, false);
        assert_eq!(a.channel, Channel::A);
        assert_eq!(b.channel, Channel::B);
        let elapsed = b.at - a.at;
        assert!((elapsed.as_secs_f64() - 0.1).abs() < 1e-9);

        let (a, b) = SimulatedEdgeSource::crossing(&config, Duration::ZERO, 18.0, true);
        assert_eq!(a.channel, Channel::B);
        assert_eq!(b.channel, Channel::A);
    }

    #[test]
    fn test_simulation_emits_pairs() {
        let source = SimulatedEdgeSource::new(
            CaptureClock::start(),
            SimulationConfig {
                min_speed_kmh: 100.0,
                max_speed_kmh: 150.0,
                min_gap: Duration::from_millis(5),
                max_gap: Duration::from_millis(10),
                ..Default::default()
            },
        );

        let edges = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&edges);
        source.listen(Arc::new(move |edge| sink.lock().unwrap().push(edge)));
        assert!(source.is_listening());

        thread::sleep(Duration::from_millis(300));
        source.stop();
        assert!(!source.is_listening());

        let edges = edges.lock().unwrap();
        assert!(edges.len() >= 2, "got {} edges", edges.len());
        assert_ne!(edges[0].channel, edges[1].channel);
        assert!(edges[1].at > edges[0].at);
    }
}
