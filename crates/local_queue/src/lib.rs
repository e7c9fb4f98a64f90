//! # Local Queue
//!
//! Append-only, crash-safe store of measurements awaiting replication.
//!
//! Responsibilities:
//! - Persist each measurement (write + fsync) before acknowledging it
//! - Track replication state (`Pending` → `Synced`) and rejection flags
//! - Repair a torn journal tail on open
//! - Refuse a second owner of the same journal
//! - Expose an async, shareable handle for the capture, sync and API tasks
//!
//! The framed [`Journal`] is generic and also backs the central record
//! store.

pub mod error;
pub mod journal;
pub mod lock;
pub mod queue;
pub mod shared;

pub use error::QueueError;
pub use journal::{Journal, Replay};
pub use lock::JournalLock;
pub use queue::{CompactStats, JournalEntry, LocalQueue, RejectedEntry};
pub use shared::SharedQueue;
