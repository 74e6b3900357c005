//! Relay HTTP server.
//!
//! Mounts the event channel endpoint, the broadcast ingress and the health
//! check on one axum router.

use std::future::Future;
use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{RelayConfig, BROADCAST_PATH, HEALTH_PATH};
use crate::error::RelayError;
use crate::ingress;
use crate::state::AppState;
use crate::ws::ws_handler;

/// Builds the relay router.
pub fn build_router(state: AppState) -> Router {
    let ws_path = state.config.ws_path.clone();

    Router::new()
        .route(&ws_path, get(ws_handler))
        .route(BROADCAST_PATH, post(ingress::broadcast))
        .route(HEALTH_PATH, get(ingress::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// The relay server.
#[derive(Debug)]
pub struct Server {
    config: RelayConfig,
    state: AppState,
}

impl Server {
    /// Creates a server.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let state = AppState::new(config.clone());
        Ok(Self { config, state })
    }

    /// Returns the shared state, e.g. to publish in-process.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Binds the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(self) -> Result<BoundServer, RelayError> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, ws_path = %self.config.ws_path, "relay listening");

        Ok(BoundServer {
            listener,
            local_addr,
            state: self.state,
        })
    }

    /// Binds and serves until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or serving fails.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), RelayError> {
        self.bind().await?.serve(shutdown).await
    }
}

/// A server bound to its listening socket.
#[derive(Debug)]
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: AppState,
}

impl BoundServer {
    /// Returns the address actually bound.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the shared state.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serves until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), RelayError> {
        let router = build_router(self.state);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("relay stopped");
        Ok(())
    }
}
