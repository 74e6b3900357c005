//! WebSocket connection state.
//!
//! Provides connection ids and the outbound side of a connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::registry::ChannelSink;
use crate::error::DeliveryError;

/// A serialized frame, shared by every connection it is fanned out to.
pub type Frame = Arc<str>;

/// Global connection ID counter.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique connection ID.
#[must_use]
pub fn next_connection_id() -> u64 {
    CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Outbound side of one client connection.
///
/// Frames go into a bounded queue drained by the connection's writer task.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique connection ID.
    pub id: u64,

    /// Sender for outgoing frames.
    pub sender: mpsc::Sender<Frame>,
}

impl Connection {
    /// Creates a new connection.
    #[must_use]
    pub fn new(sender: mpsc::Sender<Frame>) -> Self {
        Self {
            id: next_connection_id(),
            sender,
        }
    }

    /// Creates a connection and the receiver its writer task drains.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }

    /// Returns the connection ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the number of free slots in the outbound queue.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }
}

impl ChannelSink for Connection {
    fn id(&self) -> u64 {
        self.id
    }

    fn try_deliver(&self, frame: &Frame) -> Result<(), DeliveryError> {
        self.sender
            .try_send(Arc::clone(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_connection_id() {
        let id1 = next_connection_id();
        let id2 = next_connection_id();
        assert!(id2 > id1);
    }

    #[tokio::test]
    async fn test_connection_new() {
        let (conn, _rx) = Connection::channel(10);
        assert!(conn.id() > 0);
        assert_eq!(conn.capacity(), 10);
    }

    #[tokio::test]
    async fn test_connection_deliver() {
        let (conn, mut rx) = Connection::channel(10);
        let frame: Frame = Arc::from(r#"{"type":"order:added"}"#);

        assert_eq!(conn.try_deliver(&frame), Ok(()));

        let received = rx.recv().await.expect("frame");
        assert_eq!(&*received, r#"{"type":"order:added"}"#);
    }

    #[tokio::test]
    async fn test_connection_deliver_full() {
        let (conn, _rx) = Connection::channel(1);
        let frame: Frame = Arc::from("{}");

        assert_eq!(conn.try_deliver(&frame), Ok(()));
        assert_eq!(conn.try_deliver(&frame), Err(DeliveryError::Full));
    }

    #[tokio::test]
    async fn test_connection_deliver_closed() {
        let (conn, rx) = Connection::channel(4);
        drop(rx);

        let frame: Frame = Arc::from("{}");
        assert_eq!(conn.try_deliver(&frame), Err(DeliveryError::Closed));
    }
}
