//! # Timing Engine
//!
//! Sensor timing: turns raw beam-sensor edges into speed measurements and
//! hands them to the local queue.
//!
//! Responsibilities:
//! - Pair edges from channels A and B within the pairing window
//! - Derive speed, direction and over-limit flag
//! - Keep the capture path non-blocking (bounded channels, drop on full)
//! - Persist emitted measurements through the recorder
//!
//! # Example
//!
//! ```ignore
//! let clock = CaptureClock::start();
//! let mut pipeline = CapturePipeline::start(&settings, clock, queue, shutdown_rx);
//! pipeline.register_source(Box::new(SimulatedEdgeSource::new(clock, SimulationConfig::default())));
//! pipeline.start_all();
//! // ... run ...
//! let report = pipeline.shutdown().await;
//! ```

pub mod capture;
pub mod clock;
pub mod engine;
pub mod intake;
pub mod metrics;
pub mod pipeline;
pub mod recorder;
pub mod sources;

pub use capture::CaptureLoop;
pub use clock::CaptureClock;
pub use engine::{TimingConfig, TimingEngine, TimingStats};
pub use intake::edge_callback;
pub use metrics::{CaptureMetrics, CaptureSnapshot};
pub use pipeline::{CapturePipeline, CaptureReport};
pub use recorder::{Recorder, RecorderReport};
pub use sources::{
    ReplayConfig, ReplayEdgeSource, SimulatedEdgeSource, SimulationConfig, MIN_REPLAY_SPEED,
};
