//! Registry of open event channels.
//!
//! Provides the set of connections a broadcast is fanned out to.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::connection::Frame;
use crate::error::DeliveryError;

/// Something a broadcast frame can be handed to.
pub trait ChannelSink: Send + Sync {
    /// Returns the channel's connection id.
    fn id(&self) -> u64;

    /// Hands a frame to the channel without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is saturated or gone.
    fn try_deliver(&self, frame: &Frame) -> Result<(), DeliveryError>;
}

/// Tracks every open channel by connection id.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<u64, Arc<dyn ChannelSink>>>,
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry").finish_non_exhaustive()
    }
}

impl ChannelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a channel. A channel with the same id is replaced.
    pub async fn insert(&self, sink: Arc<dyn ChannelSink>) {
        let mut channels = self.channels.write().await;
        channels.insert(sink.id(), sink);
    }

    /// Removes a channel. Returns true if it was registered.
    pub async fn remove(&self, id: u64) -> bool {
        let mut channels = self.channels.write().await;
        channels.remove(&id).is_some()
    }

    /// Returns the channels open right now.
    ///
    /// The lock is released before this returns, so callers never hold it
    /// while delivering.
    pub async fn snapshot(&self) -> Vec<Arc<dyn ChannelSink>> {
        let channels = self.channels.read().await;
        channels.values().cloned().collect()
    }

    /// Returns true if a channel with `id` is registered.
    pub async fn contains(&self, id: u64) -> bool {
        let channels = self.channels.read().await;
        channels.contains_key(&id)
    }

    /// Returns the number of open channels.
    pub async fn len(&self) -> usize {
        let channels = self.channels.read().await;
        channels.len()
    }

    /// Returns true if no channel is open.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::super::connection::Connection;
    use super::*;

    #[tokio::test]
    async fn test_registry_insert_remove() {
        let registry = ChannelRegistry::new();
        let (a, _rx_a) = Connection::channel(4);
        let (b, _rx_b) = Connection::channel(4);
        let a_id = a.id();

        registry.insert(Arc::new(a)).await;
        registry.insert(Arc::new(b)).await;
        assert_eq!(registry.len().await, 2);
        assert!(registry.contains(a_id).await);

        assert!(registry.remove(a_id).await);
        assert!(!registry.remove(a_id).await);
        assert!(!registry.contains(a_id).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_registry_snapshot_is_detached() {
        let registry = ChannelRegistry::new();
        let (a, _rx) = Connection::channel(4);
        let a_id = a.id();
        registry.insert(Arc::new(a)).await;

        let snapshot = registry.snapshot().await;
        registry.remove(a_id).await;

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_registry_same_id_replaces() {
        let registry = ChannelRegistry::new();
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let conn = Connection::new(tx);

        registry.insert(Arc::new(conn.clone())).await;
        registry.insert(Arc::new(conn)).await;

        assert_eq!(registry.len().await, 1);
    }
}
