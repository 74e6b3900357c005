//! Ordercast relay - fans order events out to connected POS clients.
//!
//! Clients hold one WebSocket event channel each. Order-mutation producers
//! publish events either over HTTP to the internal broadcast ingress or
//! in-process through a [`BroadcastRelay`]; every event is offered once to
//! every channel open at that moment.
//!
//! # Endpoints
//!
//! - `GET /` — upgrade to an event channel (path configurable)
//! - `POST /internal/ws/broadcast` — publish an event, answers with a
//!   [`PublishReport`]
//! - `GET /health` — status, open channels and counters
//!
//! # Example
//!
//! ```rust,no_run
//! use ordercast_relay::{RelayConfig, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(RelayConfig::new("127.0.0.1", 3002))?;
//!     server.run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ingress;
pub mod publisher;
pub mod relay;
pub mod server;
pub mod state;
pub mod ws;

pub use config::RelayConfig;
pub use error::{ConfigError, DeliveryError, PublishError, RelayError};
pub use publisher::{
    notify_order_added, notify_order_status_changed, EventPublisher, HttpEventPublisher,
    PublisherConfig, RelayPublisher,
};
pub use relay::{BroadcastRelay, PublishReport};
pub use server::{build_router, BoundServer, Server};
pub use state::AppState;
