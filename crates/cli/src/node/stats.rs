//! Node run statistics.

use std::time::Duration;

use contracts::{QueueStats, SyncStatus};
use observability::outcome_label;
use timing_engine::CaptureReport;

/// Statistics from a node run
#[derive(Debug, Clone, Default)]
pub struct NodeStats {
    /// Capture path report
    pub capture: CaptureReport,

    /// Queue occupancy at exit
    pub queue: QueueStats,

    /// Final sync engine status
    pub sync: SyncStatus,

    /// Total duration of the run
    pub duration: Duration,
}

impl NodeStats {
    pub fn measurements(&self) -> u64 {
        self.capture.recorder.persisted
    }

    /// Recorded measurements per minute
    pub fn per_minute(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.measurements() as f64 * 60.0 / secs
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        let timing = &self.capture.timing;

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Radar Node Statistics                   ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Capture");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Measurements recorded: {}", self.measurements());
        println!("   ├─ Per minute: {:.2}", self.per_minute());
        println!("   ├─ Persist failures: {}", self.capture.recorder.failures);
        println!("   ├─ Edges dropped (channel full): {}", self.capture.edges_dropped);
        println!("   ├─ Expired pairings: {}", timing.expired);
        println!("   ├─ Out of range: {}", timing.out_of_range);
        println!("   └─ Non-positive intervals: {}", timing.non_positive);

        println!("\n💾 Local Queue");
        println!("   ├─ Total: {}", self.queue.total);
        println!("   ├─ Pending: {}", self.queue.pending);
        println!("   ├─ Synced: {}", self.queue.synced);
        println!("   └─ Rejected: {}", self.queue.rejected);

        println!("\n📡 Sync");
        if !self.sync.enabled {
            println!("   └─ Disabled (no central_url)");
        } else {
            println!("   ├─ Cycles: {}", self.sync.cycles);
            println!("   ├─ Synced: {}", self.sync.total_synced);
            println!("   ├─ Consecutive failures: {}", self.sync.consecutive_failures);
            if let Some(ref cycle) = self.sync.last_cycle {
                println!("   ├─ Last outcome: {}", outcome_label(cycle.outcome));
            }
            match self.sync.halted {
                Some(ref reason) => println!("   └─ Halted: {}", reason),
                None => println!("   └─ Halted: no"),
            }
        }

        if self.capture.recorder.speeds.total > 0 {
            println!("\n{}", self.capture.recorder.speeds.summary());
        }

        println!();
    }
}
