//! Broadcast relay.
//!
//! Fans published events out to every open event channel. Delivery is
//! best-effort and at-most-once per connected client: the frame is encoded
//! once, handed to each channel's bounded queue without waiting, and a
//! channel that refuses it simply misses that event.

use std::sync::Arc;

use ordercast::Event;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::ws::connection::Frame;
use crate::ws::metrics::RelayMetrics;
use crate::ws::registry::{ChannelRegistry, ChannelSink};

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    /// Channels the frame was offered to.
    pub attempted: usize,
    /// Channels that accepted it.
    pub delivered: usize,
    /// Channels that refused it.
    pub failed: usize,
}

/// Fans events out to the open channels.
#[derive(Debug, Clone, Default)]
pub struct BroadcastRelay {
    registry: Arc<ChannelRegistry>,
    metrics: Arc<RelayMetrics>,
}

impl BroadcastRelay {
    /// Creates a relay with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the channel registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Returns the metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Adds a channel to the fan-out set.
    pub async fn attach(&self, sink: Arc<dyn ChannelSink>) {
        let id = sink.id();
        self.registry.insert(sink).await;
        debug!(connection = id, "channel attached");
    }

    /// Removes a channel from the fan-out set.
    pub async fn detach(&self, id: u64) {
        if self.registry.remove(id).await {
            debug!(connection = id, "channel detached");
        }
    }

    /// Returns the number of open channels.
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Publishes an event to every open channel.
    ///
    /// Keepalive pings are never fanned out. A channel that is saturated or
    /// gone is counted as failed and skipped; it never delays the others.
    ///
    /// # Errors
    ///
    /// Returns an error only if the event cannot be encoded.
    pub async fn publish(&self, event: &Event) -> Result<PublishReport, RelayError> {
        if event.is_ping() {
            debug!("not fanning out keepalive ping");
            return Ok(PublishReport::default());
        }

        let frame: Frame = Arc::from(event.to_json()?);
        let channels = self.registry.snapshot().await;

        let mut report = PublishReport {
            attempted: channels.len(),
            ..PublishReport::default()
        };

        for channel in &channels {
            match channel.try_deliver(&frame) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(connection = channel.id(), error = %e, "failed to deliver event");
                }
            }
        }

        self.metrics
            .record_publish(report.delivered as u64, report.failed as u64);
        debug!(
            kind = %event.kind,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "event published"
        );

        Ok(report)
    }
}
