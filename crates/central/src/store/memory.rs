//! In-memory record store

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use contracts::MeasurementId;

use super::index::RecordIndex;
use super::RecordStore;
use crate::error::StoreError;
use crate::record::{InsertOutcome, RecordFilter, RecordSummary, StoredRecord};

/// Record store that lives for the life of the process
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    index: Mutex<RecordIndex>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecordIndex>, StoreError> {
        self.index.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl RecordStore for MemoryRecordStore {
    async fn insert_if_absent(&self, record: StoredRecord) -> Result<InsertOutcome, StoreError> {
        Ok(self.lock()?.insert(record))
    }

    async fn get(&self, id: MeasurementId) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.lock()?.get(&id))
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self.lock()?.list(filter))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    async fn summary(&self, since: DateTime<Utc>) -> Result<RecordSummary, StoreError> {
        Ok(self.lock()?.summary(since))
    }
}
