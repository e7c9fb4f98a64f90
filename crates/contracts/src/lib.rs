//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the radar node
//! workspace. Business crates depend on this crate only; reverse dependencies
//! are prohibited.
//!
//! ## Time Model
//! - Sensor edges carry a monotonic capture-clock offset (`Duration`,
//!   nanosecond resolution). Pairing arithmetic only ever uses this clock.
//! - `Measurement::captured_at` is wall-clock UTC, derived once at capture
//!   time through a [`WallClockAnchor`] and never revised afterwards.
//!
//! ## Identity
//! - [`MeasurementId`] (UUID v4) is assigned at creation and is the sole
//!   deduplication key between the node and the central aggregator.

mod edge;
mod edge_source;
mod error;
mod ingest;
mod measurement;
mod settings;
mod status;

pub use edge::*;
pub use edge_source::{EdgeCallback, EdgeSource};
pub use error::*;
pub use ingest::*;
pub use measurement::*;
pub use settings::*;
pub use status::*;
