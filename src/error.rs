//! Protocol error types.

/// Errors raised while reading or writing wire events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Payload is not a JSON object with a string `type` field.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// Event type is not one of the order event types.
    #[error("unknown event type: {0}")]
    UnknownType(String),

    /// Event has a recognized type but its payload does not match it.
    #[error("unexpected payload for {kind}: {message}")]
    UnexpectedPayload {
        /// Event type.
        kind: String,
        /// Decoder message.
        message: String,
    },

    /// Failed to serialize an event.
    #[error("serialization error: {0}")]
    Serialization(String),
}
