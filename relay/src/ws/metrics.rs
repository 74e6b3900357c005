//! Relay metrics tracking.
//!
//! Provides atomic counters for monitoring connections and fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Metrics for the relay.
#[derive(Debug)]
pub struct RelayMetrics {
    /// Total connections opened.
    connections_opened: AtomicU64,

    /// Total connections closed.
    connections_closed: AtomicU64,

    /// Total frames received from clients.
    messages_received: AtomicU64,

    /// Total keepalive pings received.
    pings_received: AtomicU64,

    /// Total events published.
    events_published: AtomicU64,

    /// Total frames handed to a channel.
    deliveries: AtomicU64,

    /// Total frames a channel refused.
    delivery_failures: AtomicU64,

    /// Total connection errors.
    errors: AtomicU64,

    /// Start time for uptime.
    start_time: Instant,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            pings_received: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a connection opened.
    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a connection closed.
    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a frame received.
    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a keepalive ping.
    pub fn record_ping(&self) {
        self.pings_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a published event with its fan-out outcome.
    pub fn record_publish(&self, delivered: u64, failed: u64) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered, Ordering::Relaxed);
        self.delivery_failures.fetch_add(failed, Ordering::Relaxed);
    }

    /// Records an error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total connections opened.
    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    /// Returns the total connections closed.
    #[must_use]
    pub fn connections_closed(&self) -> u64 {
        self.connections_closed.load(Ordering::Relaxed)
    }

    /// Returns the current active connections.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.connections_opened()
            .saturating_sub(self.connections_closed())
    }

    /// Returns the total frames received.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Returns the total keepalive pings received.
    #[must_use]
    pub fn pings_received(&self) -> u64 {
        self.pings_received.load(Ordering::Relaxed)
    }

    /// Returns the total events published.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Returns the total successful deliveries.
    #[must_use]
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    /// Returns the total failed deliveries.
    #[must_use]
    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    /// Returns the total errors.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns the uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            connections_opened: self.connections_opened(),
            connections_closed: self.connections_closed(),
            active_connections: self.active_connections(),
            messages_received: self.messages_received(),
            pings_received: self.pings_received(),
            events_published: self.events_published(),
            deliveries: self.deliveries(),
            delivery_failures: self.delivery_failures(),
            errors: self.errors(),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

/// A point-in-time snapshot of relay metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMetricsSnapshot {
    /// Total connections opened.
    pub connections_opened: u64,
    /// Total connections closed.
    pub connections_closed: u64,
    /// Active connections.
    pub active_connections: u64,
    /// Frames received.
    pub messages_received: u64,
    /// Keepalive pings received.
    pub pings_received: u64,
    /// Events published.
    pub events_published: u64,
    /// Successful deliveries.
    pub deliveries: u64,
    /// Failed deliveries.
    pub delivery_failures: u64,
    /// Errors.
    pub errors: u64,
    /// Uptime in seconds.
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = RelayMetrics::new();
        assert_eq!(metrics.connections_opened(), 0);
        assert_eq!(metrics.connections_closed(), 0);
        assert_eq!(metrics.active_connections(), 0);
    }

    #[test]
    fn test_metrics_record_connection() {
        let metrics = RelayMetrics::new();

        metrics.record_connection_opened();
        metrics.record_connection_opened();
        assert_eq!(metrics.active_connections(), 2);

        metrics.record_connection_closed();
        assert_eq!(metrics.connections_closed(), 1);
        assert_eq!(metrics.active_connections(), 1);
    }

    #[test]
    fn test_metrics_record_publish() {
        let metrics = RelayMetrics::new();

        metrics.record_publish(3, 1);
        metrics.record_publish(2, 0);

        assert_eq!(metrics.events_published(), 2);
        assert_eq!(metrics.deliveries(), 5);
        assert_eq!(metrics.delivery_failures(), 1);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = RelayMetrics::new();

        metrics.record_connection_opened();
        metrics.record_message_received();
        metrics.record_ping();
        metrics.record_error();

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.connections_opened, 1);
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.pings_received, 1);
        assert_eq!(snapshot.errors, 1);

        let json = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(json["activeConnections"], 1);
    }
}
