//! Record stores
//!
//! Both stores keep the same in-memory index; the journal store additionally
//! appends every insert to a checksummed journal and rebuilds the index from
//! it on open.

mod index;
mod journal;
mod memory;

pub use journal::JournalRecordStore;
pub use memory::MemoryRecordStore;

use chrono::{DateTime, Utc};
use contracts::MeasurementId;

use crate::error::StoreError;
use crate::record::{InsertOutcome, RecordFilter, RecordSummary, StoredRecord};

/// Storage behind the ingestion service
///
/// `insert_if_absent` is the only write; uniqueness is by measurement id.
#[trait_variant::make(RecordStore: Send)]
pub trait LocalRecordStore {
    async fn insert_if_absent(&self, record: StoredRecord) -> Result<InsertOutcome, StoreError>;

    async fn get(&self, id: MeasurementId) -> Result<Option<StoredRecord>, StoreError>;

    /// Matching records, newest first
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Aggregates over records captured after `since`
    async fn summary(&self, since: DateTime<Utc>) -> Result<RecordSummary, StoreError>;
}
