//! WebSocket module for live order events.
//!
//! Every connected client gets one event channel. Channels are registered
//! with the relay on connect and removed on close or error; each has its own
//! bounded outbound queue and writer task.
//!
//! # Inbound frames
//!
//! - `__ping__` — client keepalive, counted and otherwise ignored
//! - anything else — logged and ignored

pub mod connection;
pub mod handler;
pub mod metrics;
pub mod registry;

pub use connection::{Connection, Frame};
pub use handler::ws_handler;
pub use metrics::{RelayMetrics, RelayMetricsSnapshot};
pub use registry::{ChannelRegistry, ChannelSink};
