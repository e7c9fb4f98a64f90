//! LocalQueue - durable store of measurements awaiting replication
//!
//! State is rebuilt from the journal on open. Every mutation is journaled
//! and fsynced before the in-memory view changes, so a crash can only lose
//! an operation that had not yet returned.

use chrono::{DateTime, Utc};
use contracts::{Measurement, MeasurementId, QueueStats, SyncState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::journal::Journal;

/// One journal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry {
    /// New measurement (carries its sync_state; compaction writes Synced ones)
    Appended(Measurement),
    /// Acknowledged by the central side
    Synced { id: MeasurementId },
    /// Refused as malformed; held back from delivery
    Rejected {
        id: MeasurementId,
        reason: String,
        at: DateTime<Utc>,
    },
    /// Operator cleared a rejection flag
    Released { id: MeasurementId },
}

/// A Pending entry held back for operator attention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedEntry {
    pub id: MeasurementId,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Result of a compaction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactStats {
    pub frames_before: usize,
    pub frames_after: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Local durable queue
pub struct LocalQueue {
    journal: Journal<JournalEntry>,
    /// Creation order
    entries: Vec<Measurement>,
    index: HashMap<MeasurementId, usize>,
    flags: HashMap<MeasurementId, RejectedEntry>,
}

impl LocalQueue {
    /// Open (or create) the queue journal at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let (journal, replay) = Journal::<JournalEntry>::open(path)?;

        let mut queue = Self {
            journal,
            entries: Vec::new(),
            index: HashMap::new(),
            flags: HashMap::new(),
        };
        for entry in replay.entries {
            queue.apply(entry);
        }

        let stats = queue.stats();
        info!(
            path = %queue.journal.path().display(),
            total = stats.total,
            pending = stats.pending,
            rejected = stats.rejected,
            truncated_bytes = replay.truncated_bytes,
            "Local queue opened"
        );
        Ok(queue)
    }

    /// Durably persist a new measurement
    pub fn append(&mut self, measurement: Measurement) -> Result<(), QueueError> {
        if self.index.contains_key(&measurement.id) {
            return Err(QueueError::DuplicateId { id: measurement.id });
        }

        let entry = JournalEntry::Appended(measurement);
        self.journal.append(&entry)?;
        self.apply(entry);
        Ok(())
    }

    /// All Pending measurements in creation order (flagged ones included)
    pub fn pending(&self) -> Vec<Measurement> {
        self.entries
            .iter()
            .filter(|m| m.is_pending())
            .cloned()
            .collect()
    }

    /// Up to `limit` Pending measurements eligible for delivery
    ///
    /// Flagged entries are skipped until released.
    pub fn deliverable(&self, limit: usize) -> Vec<Measurement> {
        self.entries
            .iter()
            .filter(|m| m.is_pending() && !self.flags.contains_key(&m.id))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Transition one entry to Synced
    ///
    /// Returns `Ok(false)` when the entry was already Synced.
    pub fn mark_synced(&mut self, id: MeasurementId) -> Result<bool, QueueError> {
        let measurement = self.lookup(id)?;
        if !measurement.is_pending() {
            return Ok(false);
        }

        let entry = JournalEntry::Synced { id };
        self.journal.append(&entry)?;
        self.apply(entry);
        Ok(true)
    }

    /// Hold a Pending entry back from delivery
    ///
    /// Returns `Ok(false)` when the entry is Synced or already flagged.
    pub fn flag_rejected(
        &mut self,
        id: MeasurementId,
        reason: impl Into<String>,
    ) -> Result<bool, QueueError> {
        let measurement = self.lookup(id)?;
        if !measurement.is_pending() || self.flags.contains_key(&id) {
            return Ok(false);
        }

        let entry = JournalEntry::Rejected {
            id,
            reason: reason.into(),
            at: Utc::now(),
        };
        self.journal.append(&entry)?;
        self.apply(entry);
        Ok(true)
    }

    /// Clear a rejection flag so the entry is delivered again
    ///
    /// Returns `Ok(false)` when the entry was not flagged.
    pub fn release(&mut self, id: MeasurementId) -> Result<bool, QueueError> {
        self.lookup(id)?;
        if !self.flags.contains_key(&id) {
            return Ok(false);
        }

        let entry = JournalEntry::Released { id };
        self.journal.append(&entry)?;
        self.apply(entry);
        Ok(true)
    }

    /// Clear every rejection flag, returning how many were released
    pub fn release_all(&mut self) -> Result<usize, QueueError> {
        let ids: Vec<MeasurementId> = self.rejected().into_iter().map(|r| r.id).collect();
        let mut released = 0;
        for id in ids {
            if self.release(id)? {
                released += 1;
            }
        }
        Ok(released)
    }

    /// Flagged entries in creation order
    pub fn rejected(&self) -> Vec<RejectedEntry> {
        self.entries
            .iter()
            .filter_map(|m| self.flags.get(&m.id).cloned())
            .collect()
    }

    pub fn is_flagged(&self, id: &MeasurementId) -> bool {
        self.flags.contains_key(id)
    }

    pub fn stats(&self) -> QueueStats {
        let pending = self.entries.iter().filter(|m| m.is_pending()).count();
        QueueStats {
            total: self.entries.len(),
            pending,
            synced: self.entries.len() - pending,
            rejected: self.flags.len(),
        }
    }

    /// Recorded measurements, newest first
    pub fn history(&self, limit: usize, offset: usize) -> Vec<Measurement> {
        self.entries
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &MeasurementId) -> Option<Measurement> {
        self.index.get(id).map(|&pos| self.entries[pos].clone())
    }

    /// Most recent measurement
    pub fn last(&self) -> Option<Measurement> {
        self.entries.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        self.journal.path()
    }

    /// Rewrite the journal as one frame per measurement plus active flags
    ///
    /// Never drops a measurement.
    pub fn compact(&mut self) -> Result<CompactStats, QueueError> {
        let frames_before = self.journal.frames();
        let bytes_before = self.journal.len_bytes();

        let mut compacted: Vec<JournalEntry> = self
            .entries
            .iter()
            .cloned()
            .map(JournalEntry::Appended)
            .collect();
        compacted.extend(self.rejected().into_iter().map(|r| JournalEntry::Rejected {
            id: r.id,
            reason: r.reason,
            at: r.at,
        }));
        self.journal.rewrite(&compacted)?;

        let stats = CompactStats {
            frames_before,
            frames_after: self.journal.frames(),
            bytes_before,
            bytes_after: self.journal.len_bytes(),
        };
        info!(
            frames_before = stats.frames_before,
            frames_after = stats.frames_after,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "Local queue compacted"
        );
        Ok(stats)
    }

    fn lookup(&self, id: MeasurementId) -> Result<&Measurement, QueueError> {
        self.index
            .get(&id)
            .map(|&pos| &self.entries[pos])
            .ok_or(QueueError::UnknownId { id })
    }

    /// Apply a journaled entry to the in-memory view
    fn apply(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Appended(measurement) => {
                if self.index.contains_key(&measurement.id) {
                    warn!(measurement_id = %measurement.id, "Duplicate append in journal, ignored");
                    return;
                }
                self.index.insert(measurement.id, self.entries.len());
                self.entries.push(measurement);
            }
            JournalEntry::Synced { id } => match self.index.get(&id) {
                Some(&pos) => {
                    self.entries[pos].sync_state = SyncState::Synced;
                    self.flags.remove(&id);
                }
                None => warn!(measurement_id = %id, "Synced marker for unknown id, ignored"),
            },
            JournalEntry::Rejected { id, reason, at } => {
                let pending = self
                    .index
                    .get(&id)
                    .map(|&pos| self.entries[pos].is_pending())
                    .unwrap_or(false);
                if pending {
                    self.flags.insert(id, RejectedEntry { id, reason, at });
                } else {
                    debug!(measurement_id = %id, "Rejection marker for non-pending id, ignored");
                }
            }
            JournalEntry::Released { id } => {
                self.flags.remove(&id);
            }
        }
    }
}
