//! Replay edge source - plays back recorded edges from a JSONL file
//!
//! Each line is one `SensorEdge` (`{"channel":"A","at":1500000,"kind":"falling"}`).
//! Recorded spacing between edges is preserved exactly in the emitted
//! timestamps, so replayed pairs reproduce the recorded speeds. The speed
//! multiplier only changes how fast edges are paced out in real time, and
//! never drops below [`MIN_REPLAY_SPEED`]: played slower than recorded, a
//! pair's second edge would arrive after the real-time pair expiry even
//! though its stamp is inside the window.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{EdgeCallback, EdgeSource, SensorEdge};
use tracing::{debug, info, warn};

use crate::clock::CaptureClock;

/// Slowest playback pace
pub const MIN_REPLAY_SPEED: f64 = 1.0;

/// Replay settings
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Playback pacing (1.0 = recorded pace, at least [`MIN_REPLAY_SPEED`])
    pub speed_multiplier: f64,
}

impl ReplayConfig {
    /// Effective pace; values below the minimum (or NaN) play at recorded pace
    pub fn pacing(&self) -> f64 {
        if self.speed_multiplier.is_nan() {
            return MIN_REPLAY_SPEED;
        }
        self.speed_multiplier.max(MIN_REPLAY_SPEED)
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
        }
    }
}

pub struct ReplayEdgeSource {
    name: String,
    clock: CaptureClock,
    edges: Arc<Vec<SensorEdge>>,
    config: ReplayConfig,
    listening: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReplayEdgeSource {
    /// Load edges from a JSONL recording
    pub fn load(path: &Path, clock: CaptureClock, config: ReplayConfig) -> std::io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);

        let mut edges = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let edge: SensorEdge = serde_json::from_str(line).map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("line {}: {e}", line_no + 1),
                )
            })?;
            edges.push(edge);
        }

        info!(path = %path.display(), edges = edges.len(), "Loaded edge recording");
        Ok(Self::from_edges(edges, clock, config))
    }

    /// Replay an in-memory edge list
    pub fn from_edges(mut edges: Vec<SensorEdge>, clock: CaptureClock, config: ReplayConfig) -> Self {
        edges.sort_by_key(|e| e.at);
        Self {
            name: "replay".to_string(),
            clock,
            edges: Arc::new(edges),
            config,
            listening: Arc::new(AtomicBool::new(false)),
            thread_handle: Mutex::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl EdgeSource for ReplayEdgeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, callback: EdgeCallback) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let listening = Arc::clone(&self.listening);
        let edges = Arc::clone(&self.edges);
        let clock = self.clock;
        let speed = self.config.pacing();
        let name = self.name.clone();

        let handle = thread::spawn(move || {
            let Some(first) = edges.first().map(|e| e.at) else {
                warn!(source = %name, "No edges to replay");
                listening.store(false, Ordering::SeqCst);
                return;
            };

            debug!(source = %name, edges = edges.len(), speed, "Replay started");
            let base = clock.now();
            let started = Instant::now();

            for edge in edges.iter() {
                if !listening.load(Ordering::Relaxed) {
                    debug!(source = %name, "Replay stopped");
                    return;
                }

                let offset = edge.at - first;
                let target = Duration::from_secs_f64(offset.as_secs_f64() / speed);
                let actual = started.elapsed();
                if target > actual {
                    thread::sleep(target - actual);
                }

                callback(SensorEdge {
                    at: base + offset,
                    ..*edge
                });
            }

            info!(source = %name, "Replay completed");
            listening.store(false, Ordering::SeqCst);
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
