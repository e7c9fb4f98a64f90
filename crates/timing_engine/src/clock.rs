//! Capture clock
//!
//! Monotonic time origin shared by edge sources and the capture loop, plus
//! the wall-clock anchor taken at the same instant.

use chrono::{DateTime, Utc};
use contracts::WallClockAnchor;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct CaptureClock {
    origin: Instant,
    anchor: WallClockAnchor,
}

impl CaptureClock {
    /// Start a clock at monotonic zero, anchored to the current wall time
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
            anchor: WallClockAnchor::now(),
        }
    }

    /// Monotonic offset since the clock started
    pub fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    pub fn anchor(&self) -> WallClockAnchor {
        self.anchor
    }

    pub fn wall_time(&self, at: Duration) -> DateTime<Utc> {
        self.anchor.wall_time(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = CaptureClock::start();
        let a = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        let b = clock.now();
        assert!(b > a);
        assert!(clock.wall_time(b) >= clock.wall_time(a));
    }
}
