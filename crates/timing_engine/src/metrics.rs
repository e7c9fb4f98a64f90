//! Capture path counters
//!
//! Shared between the edge callback, the capture loop, the recorder and the
//! management API. Lock-free; every read is a relaxed snapshot.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::TimingStats;

#[derive(Debug, Default)]
pub struct CaptureMetrics {
    edges_received: AtomicU64,
    edges_dropped: AtomicU64,
    emitted: AtomicU64,
    expired: AtomicU64,
    debounced: AtomicU64,
    out_of_range: AtomicU64,
    non_positive: AtomicU64,
    ignored_edges: AtomicU64,
    handoff_dropped: AtomicU64,
    persisted: AtomicU64,
    persist_failures: AtomicU64,
}

impl CaptureMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_edges_received(&self) {
        self.edges_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_edges_dropped(&self) {
        self.edges_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_handoff_dropped(&self) {
        self.handoff_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_persist_failures(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Mirror the engine counters (owned by the capture task)
    pub fn update_timing(&self, stats: TimingStats) {
        self.emitted.store(stats.emitted, Ordering::Relaxed);
        self.expired.store(stats.expired, Ordering::Relaxed);
        self.debounced.store(stats.debounced, Ordering::Relaxed);
        self.out_of_range.store(stats.out_of_range, Ordering::Relaxed);
        self.non_positive.store(stats.non_positive, Ordering::Relaxed);
        self.ignored_edges.store(stats.ignored_edges, Ordering::Relaxed);
    }

    pub fn edges_dropped(&self) -> u64 {
        self.edges_dropped.load(Ordering::Relaxed)
    }

    pub fn handoff_dropped(&self) -> u64 {
        self.handoff_dropped.load(Ordering::Relaxed)
    }

    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            edges_received: self.edges_received.load(Ordering::Relaxed),
            edges_dropped: self.edges_dropped(),
            timing: TimingStats {
                emitted: self.emitted.load(Ordering::Relaxed),
                expired: self.expired.load(Ordering::Relaxed),
                debounced: self.debounced.load(Ordering::Relaxed),
                out_of_range: self.out_of_range.load(Ordering::Relaxed),
                non_positive: self.non_positive.load(Ordering::Relaxed),
                ignored_edges: self.ignored_edges.load(Ordering::Relaxed),
            },
            handoff_dropped: self.handoff_dropped(),
            persisted: self.persisted(),
            persist_failures: self.persist_failures(),
        }
    }
}

/// Point-in-time copy of the capture counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSnapshot {
    pub edges_received: u64,
    pub edges_dropped: u64,
    #[serde(flatten)]
    pub timing: TimingStats,
    pub handoff_dropped: u64,
    pub persisted: u64,
    pub persist_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = CaptureMetrics::new();
        metrics.inc_edges_received();
        metrics.inc_edges_received();
        metrics.inc_edges_dropped();
        metrics.inc_persisted();
        metrics.update_timing(TimingStats {
            emitted: 4,
            expired: 1,
            ..Default::default()
        });

        let snap = metrics.snapshot();
        assert_eq!(snap.edges_received, 2);
        assert_eq!(snap.edges_dropped, 1);
        assert_eq!(snap.timing.emitted, 4);
        assert_eq!(snap.timing.expired, 1);
        assert_eq!(snap.persisted, 1);

        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["emitted"], 4);
    }
}
