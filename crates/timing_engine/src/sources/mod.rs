//! Edge sources
//!
//! Real GPIO interrupt shims live outside this crate and plug in through
//! the same `EdgeSource` trait.

mod replay;
mod simulated;

pub use replay::{ReplayConfig, ReplayEdgeSource, MIN_REPLAY_SPEED};
pub use simulated::{SimulatedEdgeSource, SimulationConfig};
