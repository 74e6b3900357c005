//! Ordercast client - live order events for POS front ends.
//!
//! This crate keeps a single, shared WebSocket channel to the Ordercast
//! relay per process and hands every inbound order event to the features
//! that registered for it.
//!
//! # Core Types
//!
//! - [`ConnectionManager`] — Registration, fan-out and reconnect handling
//! - [`Subscriber`] — Message handler plus optional lifecycle callbacks
//! - [`ManagerConfig`] — Endpoint, backoff, keepalive and grace settings
//! - [`ConnectionState`] — Lifecycle of the shared channel
//!
//! # Example
//!
//! ```rust,no_run
//! use ordercast_client::{install_global, ConnectionManager, ManagerConfig, Subscriber};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ordercast_client::WsError> {
//!     let manager = ConnectionManager::new(ManagerConfig::new("http://localhost"))?;
//!     install_global(manager.clone())?;
//!
//!     let _handle = manager.register(Subscriber::new(|event| println!("{}", event.kind)));
//!     Ok(())
//! }
//! ```

pub mod ws;

pub use ordercast::{Event, OrderEvent, ORDER_ADDED, ORDER_STATUS_CHANGED};
pub use ws::{
    global, global_or_init, install_global, ConnectionManager, ConnectionState, ManagerConfig,
    ManagerStats, Subscriber, SubscriptionHandle, WsError,
};
