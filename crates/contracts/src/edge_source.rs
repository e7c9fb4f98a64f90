//! EdgeSource trait - Sensor edge source abstraction
//!
//! Decouples the capture path from where edges come from (hardware interrupt
//! shim, simulation, recorded replay).

use std::sync::Arc;

use crate::SensorEdge;

/// Edge callback type
///
/// Invoked from the producer's context (interrupt thread, simulation thread).
/// Implementations must not block: the capture side pushes into a bounded
/// channel and drops when full.
pub type EdgeCallback = Arc<dyn Fn(SensorEdge) + Send + Sync>;

/// Sensor edge source
///
/// # Example
///
/// ```ignore
/// let source: Box<dyn EdgeSource> = get_edge_source();
/// source.listen(Arc::new(|edge| {
///     println!("edge on {}", edge.channel);
/// }));
/// // ... run ...
/// source.stop();
/// ```
pub trait EdgeSource: Send + Sync {
    /// Source name (used for logging)
    fn name(&self) -> &str;

    /// Register the edge callback and start producing
    ///
    /// Repeated calls while listening are idempotent.
    fn listen(&self, callback: EdgeCallback);

    /// Stop producing edges
    fn stop(&self);

    /// Check if currently listening
    fn is_listening(&self) -> bool;
}
