//! Node runtime orchestration.

mod orchestrator;
mod stats;

pub use orchestrator::{EdgeSourceMode, Node, NodeConfig};
pub use stats::NodeStats;
