//! # Central
//!
//! Central-side ingestion contract: accepts measurement submissions from
//! radar nodes, validates them and stores each measurement id exactly once.
//!
//! Resubmitting an already stored id is a success (`Duplicate`), which is
//! what lets nodes retry freely after a lost acknowledgment.

mod error;
pub mod http;
mod record;
mod service;
mod store;

pub use error::StoreError;
pub use http::{router, serve, ListResponse};
pub use record::{
    HourlySummary, InsertOutcome, RadarSummary, RecordFilter, RecordSummary, StoredRecord,
    DEFAULT_LIST_LIMIT, DEFAULT_SUMMARY_HOURS, MAX_LIST_LIMIT, MAX_SUMMARY_HOURS,
};
pub use service::{parse_submission, IngestResponse, IngestionService};
pub use store::{JournalRecordStore, LocalRecordStore, MemoryRecordStore, RecordStore};
