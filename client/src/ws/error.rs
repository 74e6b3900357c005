//! WebSocket error types.
//!
//! Provides error types for connection manager operations.

use ordercast::ProtocolError;

/// WebSocket errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WsError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// WebSocket protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failed to serialize message.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize message.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    Closed,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// No Tokio runtime to drive the manager.
    #[error("no Tokio runtime available: {0}")]
    NoRuntime(String),

    /// A process-wide manager is already installed.
    #[error("global connection manager already installed")]
    AlreadyInstalled,
}

impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<ProtocolError> for WsError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Serialization(msg) => Self::Serialization(msg),
            other => Self::Deserialization(other.to_string()),
        }
    }
}
