//! Subscriber registration contract.
//!
//! Each feature that wants live order events builds a [`Subscriber`] and
//! registers it with the connection manager. Registration returns a
//! [`SubscriptionHandle`]; passing it back to `unregister` removes every
//! callback the subscriber contributed.
//!
//! Callbacks run inline on the manager's state machine, one at a time, and
//! must not block.

use std::fmt;

use ordercast::Event;

use super::error::WsError;
use super::transport::CloseInfo;

/// Handler for inbound events.
pub type MessageHandler = Box<dyn Fn(&Event) + Send + Sync>;

/// Handler invoked when the channel opens.
pub type OpenHandler = Box<dyn Fn() + Send + Sync>;

/// Handler invoked when the channel closes.
pub type CloseHandler = Box<dyn Fn(&CloseInfo) + Send + Sync>;

/// Handler invoked when the channel reports an error.
pub type ErrorHandler = Box<dyn Fn(&WsError) + Send + Sync>;

/// A message handler plus optional lifecycle callbacks.
pub struct Subscriber {
    pub(crate) on_message: MessageHandler,
    pub(crate) on_open: Option<OpenHandler>,
    pub(crate) on_close: Option<CloseHandler>,
    pub(crate) on_error: Option<ErrorHandler>,
}

impl Subscriber {
    /// Creates a subscriber with the given message handler.
    #[must_use]
    pub fn new(on_message: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        Self {
            on_message: Box::new(on_message),
            on_open: None,
            on_close: None,
            on_error: None,
        }
    }

    /// Sets the open callback.
    #[must_use]
    pub fn on_open(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Box::new(handler));
        self
    }

    /// Sets the close callback.
    #[must_use]
    pub fn on_close(mut self, handler: impl Fn(&CloseInfo) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(handler));
        self
    }

    /// Sets the error callback.
    #[must_use]
    pub fn on_error(mut self, handler: impl Fn(&WsError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

/// Identifies one registration.
#[must_use = "dropping the handle leaks the registration; pass it to unregister"]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
}

impl SubscriptionHandle {
    pub(crate) const fn new(id: u64) -> Self {
        Self { id }
    }

    /// Returns the registration id. Ids grow with registration order.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_subscriber_builder() {
        let subscriber = Subscriber::new(|_| {})
            .on_open(|| {})
            .on_error(|_| {});

        assert!(subscriber.on_open.is_some());
        assert!(subscriber.on_close.is_none());
        assert!(subscriber.on_error.is_some());
    }

    #[test]
    fn test_subscriber_invokes_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let subscriber = Subscriber::new(move |event| {
            if event.kind == "order:added" {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        (subscriber.on_message)(&Event::new("order:added"));
        (subscriber.on_message)(&Event::new("other"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriber_debug() {
        let subscriber = Subscriber::new(|_| {}).on_close(|_| {});
        let debug = format!("{:?}", subscriber);
        assert!(debug.contains("on_close: true"));
        assert!(debug.contains("on_open: false"));
    }

    #[test]
    fn test_handle_id() {
        let handle = SubscriptionHandle::new(42);
        assert_eq!(handle.id(), 42);
    }
}
