//! Relay configuration.
//!
//! Provides the server settings and their environment-variable loader.

use std::env;

use crate::error::ConfigError;

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 3002;

/// Default WebSocket path.
pub const DEFAULT_WS_PATH: &str = "/";

/// Default per-connection outbound buffer, in frames.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 100;

/// Path of the internal broadcast ingress.
pub const BROADCAST_PATH: &str = "/internal/ws/broadcast";

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to bind to. `0` picks a free port.
    pub port: u16,

    /// Path clients upgrade on.
    pub ws_path: String,

    /// Frames buffered per connection before deliveries to it fail.
    pub outbound_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ws_path: DEFAULT_WS_PATH.to_string(),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl RelayConfig {
    /// Creates a new configuration.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the WebSocket path.
    #[must_use]
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Sets the per-connection outbound buffer.
    #[must_use]
    pub fn with_outbound_buffer(mut self, frames: usize) -> Self {
        self.outbound_buffer = frames;
        self
    }

    /// Loads the configuration from `RELAY_HOST`, `RELAY_PORT`,
    /// `RELAY_WS_PATH` and `RELAY_OUTBOUND_BUFFER`, falling back to the
    /// defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = lookup("RELAY_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("RELAY_PORT") {
            config.port = parse_env("RELAY_PORT", &port)?;
        }
        if let Some(path) = lookup("RELAY_WS_PATH") {
            config.ws_path = path;
        }
        if let Some(buffer) = lookup("RELAY_OUTBOUND_BUFFER") {
            config.outbound_buffer = parse_env("RELAY_OUTBOUND_BUFFER", &buffer)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Returns the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }

        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(
                "ws_path must start with /".to_string(),
            ));
        }

        if self.ws_path == BROADCAST_PATH || self.ws_path == HEALTH_PATH {
            return Err(ConfigError::Invalid(format!(
                "ws_path {} collides with a built-in route",
                self.ws_path
            )));
        }

        if self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid(
                "outbound_buffer must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
