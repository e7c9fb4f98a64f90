//! Durable record store over the checksummed journal

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use contracts::MeasurementId;
use local_queue::Journal;
use tracing::{info, warn};

use super::index::RecordIndex;
use super::RecordStore;
use crate::error::StoreError;
use crate::record::{InsertOutcome, RecordFilter, RecordSummary, StoredRecord};

struct Inner {
    journal: Journal<StoredRecord>,
    index: RecordIndex,
}

/// Record store that survives restarts
///
/// Every accepted record is one journal frame; duplicates are answered from
/// the index and never written.
#[derive(Clone)]
pub struct JournalRecordStore {
    inner: Arc<Mutex<Inner>>,
    path: PathBuf,
}

impl JournalRecordStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let inner = tokio::task::spawn_blocking(move || Self::load(&open_path))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))??;

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            path,
        })
    }

    fn load(path: &Path) -> Result<Inner, StoreError> {
        let (journal, replay) = Journal::open(path)?;
        if replay.truncated_bytes > 0 {
            warn!(
                path = %path.display(),
                truncated_bytes = replay.truncated_bytes,
                "Discarded torn record journal tail"
            );
        }

        let mut index = RecordIndex::default();
        for record in replay.entries {
            index.insert(record);
        }
        info!(path = %path.display(), records = index.len(), "Record store opened");

        Ok(Inner { journal, index })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl RecordStore for JournalRecordStore {
    async fn insert_if_absent(&self, record: StoredRecord) -> Result<InsertOutcome, StoreError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock().map_err(|_| StoreError::Poisoned)?;
            if guard.index.contains(&record.measurement.id) {
                return Ok(InsertOutcome::AlreadyPresent);
            }
            // Durable before visible
            guard.journal.append(&record)?;
            Ok(guard.index.insert(record))
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }

    async fn get(&self, id: MeasurementId) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.lock()?.index.get(&id))
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self.lock()?.index.list(filter))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.index.len())
    }

    async fn summary(&self, since: DateTime<Utc>) -> Result<RecordSummary, StoreError> {
        Ok(self.lock()?.index.summary(since))
    }
}
