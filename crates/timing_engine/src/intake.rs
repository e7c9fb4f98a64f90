//! Edge intake - the callback handed to edge sources

use std::sync::Arc;

use async_channel::{Sender, TrySendError};
use contracts::{Channel, EdgeCallback, SensorEdge};
use tracing::trace;

use crate::metrics::CaptureMetrics;

/// Build the callback that feeds edges into the bounded edge channel
///
/// Runs on the producer's thread. Never blocks: when the channel is full the
/// edge is dropped and counted.
pub fn edge_callback(tx: Sender<SensorEdge>, metrics: Arc<CaptureMetrics>) -> EdgeCallback {
    Arc::new(move |edge: SensorEdge| {
        metrics.inc_edges_received();
        observability::record_edge_received(channel_label(edge.channel));

        match tx.try_send(edge) {
            Ok(()) => {
                trace!(channel = %edge.channel, "edge queued");
            }
            Err(TrySendError::Full(_)) => {
                metrics.inc_edges_dropped();
                observability::record_edge_dropped();
                trace!(channel = %edge.channel, "edge channel full, edge dropped");
            }
            Err(TrySendError::Closed(_)) => {
                trace!(channel = %edge.channel, "edge channel closed");
            }
        }
    })
}

fn channel_label(channel: Channel) -> &'static str {
    match channel {
        Channel::A => "a",
        Channel::B => "b",
    }
}
