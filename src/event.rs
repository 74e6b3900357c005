//! Order event wire format.
//!
//! [`Event`] is the untyped envelope that travels over every hop; it keeps
//! unknown fields and unknown types intact. [`OrderEvent`] is the typed view
//! of the event types this system produces.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ProtocolError;

/// Type tag of a newly created order.
pub const ORDER_ADDED: &str = "order:added";

/// Type tag of an order status change.
pub const ORDER_STATUS_CHANGED: &str = "order:status-changed";

/// Type tag of the client keepalive frame.
pub const PING: &str = "__ping__";

/// Returns the current Unix time in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A tagged event record: `{"type": "...", ...payload}`.
///
/// The payload is not validated; whatever fields arrive are preserved and
/// re-serialized as they were.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type tag.
    #[serde(rename = "type")]
    pub kind: String,

    /// Every other field of the record.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Event {
    /// Creates an event with the given type and an empty payload.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Creates a keepalive frame stamped with `ts`.
    #[must_use]
    pub fn ping(ts: i64) -> Self {
        Self::new(PING).with_field("ts", ts)
    }

    /// Creates an `order:added` event.
    #[must_use]
    pub fn order_added(order_id: impl Into<String>, order: Value, timestamp: i64) -> Self {
        let order_id: String = order_id.into();
        Self::new(ORDER_ADDED)
            .with_field("orderId", order_id)
            .with_field("order", order)
            .with_field("timestamp", timestamp)
    }

    /// Creates an `order:status-changed` event.
    #[must_use]
    pub fn order_status_changed(
        order_id: impl Into<String>,
        status: impl Into<String>,
        order: Value,
        timestamp: i64,
    ) -> Self {
        let order_id: String = order_id.into();
        let status: String = status.into();
        Self::new(ORDER_STATUS_CHANGED)
            .with_field("orderId", order_id)
            .with_field("status", status)
            .with_field("order", order)
            .with_field("timestamp", timestamp)
    }

    /// Parses an event from a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if the text is not a JSON object
    /// with a string `type` field.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Builds an event from an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if the value is not an object
    /// with a string `type` field.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Serializes the event to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Returns true if this is a keepalive frame.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.kind == PING
    }

    /// Returns a payload field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Returns the `orderId` field if present and a string.
    #[must_use]
    pub fn order_id(&self) -> Option<&str> {
        self.get("orderId").and_then(Value::as_str)
    }

    /// Returns the `timestamp` field if present and an integer.
    #[must_use]
    pub fn timestamp(&self) -> Option<i64> {
        self.get("timestamp").and_then(Value::as_i64)
    }

    /// Decodes the typed view of this event.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownType`] for types outside
    /// [`OrderEvent`], or [`ProtocolError::UnexpectedPayload`] when the
    /// payload does not fit the type.
    pub fn to_order_event(&self) -> Result<OrderEvent, ProtocolError> {
        match self.kind.as_str() {
            ORDER_ADDED | ORDER_STATUS_CHANGED | PING => {}
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        }

        let value =
            serde_json::to_value(self).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| ProtocolError::UnexpectedPayload {
            kind: self.kind.clone(),
            message: e.to_string(),
        })
    }
}

/// Typed view of the events the order pipeline produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OrderEvent {
    /// A new order was committed.
    #[serde(rename = "order:added", rename_all = "camelCase")]
    Added {
        /// Order identifier.
        order_id: String,
        /// Snapshot of the order after the mutation.
        order: Value,
        /// Commit time in Unix milliseconds.
        timestamp: i64,
    },

    /// An order changed status.
    #[serde(rename = "order:status-changed", rename_all = "camelCase")]
    StatusChanged {
        /// Order identifier.
        order_id: String,
        /// New status.
        status: String,
        /// Snapshot of the order after the mutation.
        order: Value,
        /// Commit time in Unix milliseconds.
        timestamp: i64,
    },

    /// Client keepalive.
    #[serde(rename = "__ping__")]
    Ping {
        /// Client send time in Unix milliseconds.
        ts: i64,
    },
}

impl OrderEvent {
    /// Returns the wire type tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => ORDER_ADDED,
            Self::StatusChanged { .. } => ORDER_STATUS_CHANGED,
            Self::Ping { .. } => PING,
        }
    }

    /// Returns the order snapshot carried by this event.
    ///
    /// Each snapshot is authoritative for its order; consumers should not
    /// infer ordering from arrival time.
    #[must_use]
    pub const fn order(&self) -> Option<&Value> {
        match self {
            Self::Added { order, .. } | Self::StatusChanged { order, .. } => Some(order),
            Self::Ping { .. } => None,
        }
    }
}

impl TryFrom<OrderEvent> for Event {
    type Error = ProtocolError;

    fn try_from(event: OrderEvent) -> Result<Self, Self::Error> {
        let value =
            serde_json::to_value(&event).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        Self::from_value(value)
    }
}
