//! Relay error types.

use ordercast::ProtocolError;
use thiserror::Error;

/// Errors from configuring or running the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Socket or server failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An event could not be encoded for fan-out.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable held an unusable value.
    #[error("invalid value for {key}: {value}")]
    InvalidEnv {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },

    /// A setting failed validation.
    #[error("{0}")]
    Invalid(String),
}

/// Why a frame could not be handed to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The channel's outbound buffer is full.
    #[error("outbound buffer full")]
    Full,

    /// The channel's writer has gone away.
    #[error("channel closed")]
    Closed,
}

/// Errors reported by event publishers.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The publisher is misconfigured.
    #[error("publisher configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The event could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The relay could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The relay rejected the event.
    #[error("relay rejected event with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The in-process relay failed.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidEnv {
            key: "RELAY_PORT".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "invalid value for RELAY_PORT: abc");
    }

    #[test]
    fn test_relay_error_from_config() {
        let err = RelayError::from(ConfigError::Invalid("port must be > 0".to_string()));
        assert!(matches!(err, RelayError::Config(_)));
        assert!(err.to_string().contains("port must be > 0"));
    }

    #[test]
    fn test_publish_error_rejected_display() {
        let err = PublishError::Rejected {
            status: 400,
            body: "bad".to_string(),
        };
        assert_eq!(err.to_string(), "relay rejected event with status 400: bad");
    }

    #[test]
    fn test_publish_error_from_config() {
        let err = PublishError::from(ConfigError::Invalid("timeout must be > 0".to_string()));
        assert!(matches!(err, PublishError::Config(_)));
        assert!(err.to_string().starts_with("publisher configuration error"));
    }

    #[test]
    fn test_delivery_error_display() {
        assert_eq!(DeliveryError::Full.to_string(), "outbound buffer full");
        assert_eq!(DeliveryError::Closed.to_string(), "channel closed");
    }
}
