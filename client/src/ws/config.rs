//! Connection manager configuration.
//!
//! Provides configuration options for the process-wide connection manager.

use std::time::Duration;

use url::Url;

use super::error::WsError;

/// Default page origin used to derive the relay endpoint.
pub const DEFAULT_ORIGIN: &str = "http://localhost";

/// Default relay port.
pub const DEFAULT_RELAY_PORT: u16 = 3002;

/// Default relay WebSocket path.
pub const DEFAULT_PATH: &str = "/";

/// Default keepalive interval in seconds.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 25;

/// Default base reconnect interval in milliseconds.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1000;

/// Maximum reconnect delay in seconds.
pub const MAX_RECONNECT_DELAY_SECS: u64 = 30;

/// Default maximum number of consecutive reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 50;

/// Default grace window before closing an unused channel, in milliseconds.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 100;

/// Connection manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Origin of the page hosting the client, e.g. `https://pos.example.com`.
    ///
    /// Its scheme selects `ws` or `wss`; its host names the relay.
    pub origin: String,

    /// Port the relay listens on.
    pub relay_port: u16,

    /// WebSocket path on the relay.
    pub path: String,

    /// Whether to reconnect after the channel closes.
    pub auto_reconnect: bool,

    /// Base reconnect delay.
    pub reconnect_interval: Duration,

    /// Upper bound for the reconnect delay.
    pub max_reconnect_delay: Duration,

    /// Consecutive reconnect attempts before giving up until the next
    /// registration.
    pub max_reconnect_attempts: u32,

    /// Interval between keepalive pings while open.
    pub keepalive_interval: Duration,

    /// How long the listener set must stay empty before the channel closes.
    pub grace_period: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            relay_port: DEFAULT_RELAY_PORT,
            path: DEFAULT_PATH.to_string(),
            auto_reconnect: true,
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            max_reconnect_delay: Duration::from_secs(MAX_RECONNECT_DELAY_SECS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            keepalive_interval: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            grace_period: Duration::from_millis(DEFAULT_GRACE_PERIOD_MS),
        }
    }
}

impl ManagerConfig {
    /// Creates a new configuration for the given page origin.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    /// Sets the relay port.
    #[must_use]
    pub fn with_relay_port(mut self, port: u16) -> Self {
        self.relay_port = port;
        self
    }

    /// Sets the relay WebSocket path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Enables or disables automatic reconnection.
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the base reconnect delay.
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets the maximum reconnect delay.
    #[must_use]
    pub fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    /// Sets the maximum reconnection attempts.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the keepalive interval.
    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Sets the teardown grace period.
    #[must_use]
    pub fn with_grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    /// Derives the relay endpoint from the page origin.
    ///
    /// `https` origins map to `wss`, `http` to `ws`. `localhost` is pinned
    /// to `127.0.0.1` so the client never races `::1` against an IPv4-only
    /// relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin cannot be parsed, has no host, or uses
    /// a scheme other than `http`/`https`.
    pub fn endpoint(&self) -> Result<String, WsError> {
        let origin = Url::parse(&self.origin)
            .map_err(|e| WsError::InvalidConfig(format!("invalid origin {}: {}", self.origin, e)))?;

        let scheme = match origin.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(WsError::InvalidConfig(format!(
                    "unsupported origin scheme: {}",
                    other
                )))
            }
        };

        let host = match origin.host_str() {
            Some("localhost") => "127.0.0.1",
            Some(host) => host,
            None => {
                return Err(WsError::InvalidConfig(format!(
                    "origin has no host: {}",
                    self.origin
                )))
            }
        };

        Ok(format!("{}://{}:{}{}", scheme, host, self.relay_port, self.path))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), WsError> {
        self.endpoint()?;

        if !self.path.starts_with('/') {
            return Err(WsError::InvalidConfig(
                "path must start with /".to_string(),
            ));
        }

        if self.reconnect_interval.is_zero() {
            return Err(WsError::InvalidConfig(
                "reconnect_interval must be > 0".to_string(),
            ));
        }

        if self.max_reconnect_delay < self.reconnect_interval {
            return Err(WsError::InvalidConfig(
                "max_reconnect_delay must be >= reconnect_interval".to_string(),
            ));
        }

        if self.keepalive_interval.is_zero() {
            return Err(WsError::InvalidConfig(
                "keepalive_interval must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
