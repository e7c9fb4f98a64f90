//! Status snapshots - shared between the sync engine, the queue and the
//! management API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// All measurements ever recorded
    pub total: usize,
    /// Awaiting acknowledgment (includes flagged entries)
    pub pending: usize,
    /// Acknowledged by the central side
    pub synced: usize,
    /// Pending entries held back for operator attention
    pub rejected: usize,
}

/// How a sync cycle ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Nothing was pending
    #[default]
    Idle,
    /// Every attempted entry was acknowledged or flagged
    Completed,
    /// Stopped early on a transport / server failure
    TransportFailure,
    /// Credentials refused; delivery halted
    AuthRejected,
    /// Shutdown requested mid-cycle
    Interrupted,
    /// Delivery disabled (no central endpoint configured) or halted earlier
    Skipped,
    /// Local queue could not be read
    QueueError,
}

/// Report for one sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Pending entries eligible at cycle start
    pub eligible: usize,
    /// Submissions actually sent
    pub attempted: usize,
    /// Newly accepted
    pub accepted: usize,
    /// Acknowledged as already stored
    pub duplicates: usize,
    /// Flagged for operator attention
    pub rejected: usize,
    /// Transient failures
    pub failed: usize,
    pub outcome: CycleOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl CycleReport {
    /// Entries transitioned to Synced in this cycle
    pub fn synced(&self) -> usize {
        self.accepted + self.duplicates
    }

    /// A cycle counts as failed when it could not make the progress it tried to
    pub fn is_failure(&self) -> bool {
        matches!(
            self.outcome,
            CycleOutcome::TransportFailure | CycleOutcome::AuthRejected | CycleOutcome::QueueError
        )
    }
}

/// Sync engine status published to observers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Whether a central endpoint is configured
    pub enabled: bool,
    /// Failed cycles in a row (reset by a non-failing cycle)
    pub consecutive_failures: u32,
    /// Cycles run since start
    pub cycles: u64,
    /// Most recent cycle
    pub last_cycle: Option<CycleReport>,
    /// Last time at least one entry was acknowledged
    pub last_success_at: Option<DateTime<Utc>>,
    /// Set when delivery stopped on an authentication rejection
    pub halted: Option<String>,
    /// Entries acknowledged since start
    pub total_synced: u64,
    /// Entries flagged since start
    pub total_rejected: u64,
}
