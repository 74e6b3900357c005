//! Shared WebSocket connection for order events.
//!
//! Every feature in a process registers with one [`ConnectionManager`],
//! which keeps at most one channel to the relay open, fans inbound events
//! out to every registered listener, reconnects with exponential backoff
//! and closes the channel shortly after the last listener leaves.
//!
//! # Example
//!
//! ```rust,no_run
//! use ordercast_client::ws::{ConnectionManager, Subscriber};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ConnectionManager::with_origin("https://pos.example.com")?;
//!
//!     let handle = manager.register(Subscriber::new(|event| {
//!         if let Some(order_id) = event.order_id() {
//!             println!("{} for order {}", event.kind, order_id);
//!         }
//!     }));
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     manager.unregister(handle);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod global;
pub mod manager;
pub mod state;
pub mod subscriber;
pub mod transport;

pub use backoff::ReconnectBackoff;
pub use config::ManagerConfig;
pub use error::WsError;
pub use global::{global, global_or_init, install_global};
pub use manager::ConnectionManager;
pub use state::{ConnectionState, ManagerStats};
pub use subscriber::{Subscriber, SubscriptionHandle};
pub use transport::{
    ChannelEvent, ChannelHandle, ChannelSink, CloseInfo, Outbound, Transport,
    TungsteniteTransport,
};
