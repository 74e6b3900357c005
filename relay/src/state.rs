//! Shared application state.

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::relay::BroadcastRelay;

/// State shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The broadcast relay.
    pub relay: BroadcastRelay,
    /// Server configuration.
    pub config: Arc<RelayConfig>,
}

impl AppState {
    /// Creates a new application state.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self {
            relay: BroadcastRelay::new(),
            config: Arc::new(config),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
