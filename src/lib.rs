//! Ordercast - shared wire protocol for real-time order events.
//!
//! Every participant in the order event pipeline speaks the same JSON
//! format: a tagged object `{"type": "...", ...payload}`. This crate holds
//! that format so the relay, the producers and the client connection
//! manager agree on it.
//!
//! # Event Types
//!
//! - `order:added` — A new order was committed
//! - `order:status-changed` — An order moved to a new status
//! - `__ping__` — Client keepalive, never fanned out
//!
//! Unknown types are valid events; consumers decide what to ignore.
//!
//! # Example
//!
//! ```rust
//! use ordercast::{Event, OrderEvent};
//!
//! let event = Event::parse(r#"{"type":"order:added","orderId":"X1","order":{},"timestamp":1}"#)?;
//! assert_eq!(event.order_id(), Some("X1"));
//!
//! let typed = event.to_order_event()?;
//! assert!(matches!(typed, OrderEvent::Added { .. }));
//! # Ok::<(), ordercast::ProtocolError>(())
//! ```

pub mod error;
pub mod event;

pub use error::ProtocolError;
pub use event::{now_millis, Event, OrderEvent, ORDER_ADDED, ORDER_STATUS_CHANGED, PING};
