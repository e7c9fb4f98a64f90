//! # Sync Engine
//!
//! Store-and-forward delivery of locally recorded measurements to the
//! central aggregator.
//!
//! Responsibilities:
//! - Periodic delivery cycles over the Pending backlog, oldest first
//! - Classify failures: transient ends the cycle, rejection flags the entry,
//!   refused credentials halt delivery
//! - Publish `SyncStatus` on a watch channel
//!
//! ## Example
//!
//! ```ignore
//! use sync_engine::{HttpIngestClient, SyncConfig, SyncEngine};
//!
//! let client = HttpIngestClient::from_settings(&settings.sync)?;
//! let engine = SyncEngine::new(queue, client, SyncConfig::from_settings(&settings));
//! let status_rx = engine.subscribe();
//! let handle = tokio::spawn(engine.run(shutdown_rx));
//! ```

mod engine;
mod error;
mod http_client;

pub use engine::{SyncConfig, SyncEngine};
pub use error::SyncError;
pub use http_client::{HttpIngestClient, INGEST_PATH};
