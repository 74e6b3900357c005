//! Order event publishers.
//!
//! Order-mutation producers hand their events to an [`EventPublisher`]
//! once the mutation is committed. [`HttpEventPublisher`] posts them to the
//! relay's broadcast ingress from another process; [`RelayPublisher`] calls
//! an in-process [`BroadcastRelay`] directly.
//!
//! A failed publish must never fail the mutation that caused it, so the
//! `notify_*` helpers log and swallow every error.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use ordercast::{now_millis, Event};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::error::{ConfigError, PublishError};
use crate::relay::{BroadcastRelay, PublishReport};

/// Default broadcast ingress URL.
pub const DEFAULT_BROADCAST_URL: &str = "http://localhost:3002/internal/ws/broadcast";

/// Default request timeout in seconds.
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 5;

/// Environment variable overriding the broadcast URL.
pub const BROADCAST_URL_ENV: &str = "WS_BROADCAST_URL";

/// Publishes order events to connected clients.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be handed to the relay.
    async fn publish(&self, event: &Event) -> Result<PublishReport, PublishError>;
}

/// In-process publisher.
#[derive(Debug, Clone)]
pub struct RelayPublisher {
    relay: BroadcastRelay,
}

impl RelayPublisher {
    /// Creates a publisher for `relay`.
    #[must_use]
    pub fn new(relay: BroadcastRelay) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl EventPublisher for RelayPublisher {
    async fn publish(&self, event: &Event) -> Result<PublishReport, PublishError> {
        Ok(self.relay.publish(event).await?)
    }
}

/// HTTP publisher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Broadcast ingress URL.
    pub url: String,

    /// Request timeout.
    pub timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BROADCAST_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
        }
    }
}

impl PublisherConfig {
    /// Creates a configuration for the given ingress URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Reads the ingress URL from `WS_BROADCAST_URL`, falling back to the
    /// default.
    #[must_use]
    pub fn from_env() -> Self {
        env::var(BROADCAST_URL_ENV).map_or_else(|_| Self::default(), Self::new)
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), PublishError> {
        let url = Url::parse(&self.url).map_err(|e| {
            ConfigError::Invalid(format!("invalid broadcast url {}: {}", self.url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "broadcast url must use http or https: {}",
                self.url
            ))
            .into());
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be > 0".to_string()).into());
        }

        Ok(())
    }
}

/// Publisher that posts events to the relay's broadcast ingress.
#[derive(Debug, Clone)]
pub struct HttpEventPublisher {
    config: PublisherConfig,
    http: reqwest::Client,
}

impl HttpEventPublisher {
    /// Creates a new publisher.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: PublisherConfig) -> Result<Self, PublishError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { config, http })
    }

    /// Creates a publisher configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_env() -> Result<Self, PublishError> {
        Self::new(PublisherConfig::from_env())
    }

    /// Returns the publisher configuration.
    #[must_use]
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, event: &Event) -> Result<PublishReport, PublishError> {
        let body = event.to_json()?;
        let response = self.http.post(&self.config.url).body(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

/// Announces a newly created order. Failures are logged and swallowed.
pub async fn notify_order_added(
    publisher: &dyn EventPublisher,
    order_id: impl Into<String>,
    order: Value,
) {
    let event = Event::order_added(order_id, order, now_millis());
    notify(publisher, &event).await;
}

/// Announces an order status change. Failures are logged and swallowed.
pub async fn notify_order_status_changed(
    publisher: &dyn EventPublisher,
    order_id: impl Into<String>,
    status: impl Into<String>,
    order: Value,
) {
    let event = Event::order_status_changed(order_id, status, order, now_millis());
    notify(publisher, &event).await;
}

async fn notify(publisher: &dyn EventPublisher, event: &Event) {
    match publisher.publish(event).await {
        Ok(report) => debug!(
            kind = %event.kind,
            order_id = event.order_id().unwrap_or_default(),
            delivered = report.delivered,
            "notified clients"
        ),
        Err(e) => error!(
            kind = %event.kind,
            order_id = event.order_id().unwrap_or_default(),
            error = %e,
            "failed to notify clients"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::routing::post;
    use axum::Router;
    use ordercast::{ORDER_ADDED, ORDER_STATUS_CHANGED};
    use serde_json::json;

    use super::*;
    use crate::ingress;
    use crate::state::AppState;
    use crate::ws::connection::Connection;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: &Event) -> Result<PublishReport, PublishError> {
            self.events.lock().expect("lock").push(event.clone());
            Ok(PublishReport::default())
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: &Event) -> Result<PublishReport, PublishError> {
            Err(PublishError::Transport("connection refused".to_string()))
        }
    }

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn EventPublisher) {}

    async fn spawn_ingress(state: AppState) -> String {
        let app = Router::new()
            .route("/internal/ws/broadcast", post(ingress::broadcast))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{}/internal/ws/broadcast", addr)
    }

    #[test]
    fn test_publisher_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.url, DEFAULT_BROADCAST_URL);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_publisher_config_validate() {
        tokio_test::assert_ok!(PublisherConfig::new("https://relay.internal/broadcast").validate());

        for url in ["localhost:3002", "ftp://relay.internal/broadcast", "http://", "not a url"] {
            let result = PublisherConfig::new(url).validate();
            assert!(
                matches!(result, Err(PublishError::Config(ConfigError::Invalid(_)))),
                "{url} should be rejected, got {result:?}"
            );
        }

        let result = PublisherConfig::default()
            .with_timeout(Duration::ZERO)
            .validate();
        assert!(matches!(result, Err(PublishError::Config(_))));
    }

    #[tokio::test]
    async fn test_notify_order_added_builds_event() {
        let publisher = RecordingPublisher::default();

        notify_order_added(&publisher, "X1", json!({"items": [1, 2]})).await;

        let events = publisher.events.lock().expect("lock");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ORDER_ADDED);
        assert_eq!(events[0].order_id(), Some("X1"));
        assert_eq!(events[0].get("order"), Some(&json!({"items": [1, 2]})));
        assert!(events[0].timestamp().is_some());
    }

    #[tokio::test]
    async fn test_notify_order_status_changed_builds_event() {
        let publisher = RecordingPublisher::default();

        notify_order_status_changed(&publisher, "X2", "ready", json!({"id": "X2"})).await;

        let events = publisher.events.lock().expect("lock");
        assert_eq!(events[0].kind, ORDER_STATUS_CHANGED);
        assert_eq!(events[0].get("status"), Some(&json!("ready")));
    }

    #[tokio::test]
    async fn test_notify_swallows_failures() {
        notify_order_added(&FailingPublisher, "X1", json!({})).await;
        notify_order_status_changed(&FailingPublisher, "X1", "done", json!({})).await;
    }

    #[tokio::test]
    async fn test_relay_publisher_delivers() {
        let relay = BroadcastRelay::new();
        let (conn, mut rx) = Connection::channel(4);
        relay.attach(Arc::new(conn)).await;
        let publisher = RelayPublisher::new(relay);

        notify_order_added(&publisher, "X1", json!({})).await;

        let frame = rx.recv().await.expect("frame");
        assert_eq!(Event::parse(&frame).expect("event").order_id(), Some("X1"));
    }

    #[tokio::test]
    async fn test_http_publisher_posts_to_ingress() {
        let state = AppState::default();
        let (conn, mut rx) = Connection::channel(4);
        state.relay.attach(Arc::new(conn)).await;
        let url = spawn_ingress(state).await;

        let publisher = HttpEventPublisher::new(PublisherConfig::new(url)).expect("publisher");
        let event = Event::order_status_changed("X3", "served", json!({}), 1);
        let report = publisher.publish(&event).await.expect("publish");

        assert_eq!(report.delivered, 1);
        let frame = rx.recv().await.expect("frame");
        assert_eq!(Event::parse(&frame).expect("event"), event);
    }

    #[tokio::test]
    async fn test_http_publisher_reports_rejection() {
        let url = spawn_ingress(AppState::default()).await;
        let wrong_path = url.replace("/broadcast", "/missing");
        let publisher =
            HttpEventPublisher::new(PublisherConfig::new(wrong_path)).expect("publisher");

        let result = publisher.publish(&Event::new(ORDER_ADDED)).await;

        assert!(matches!(
            result,
            Err(PublishError::Rejected { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_http_publisher_unreachable() {
        let config = PublisherConfig::new("http://127.0.0.1:9/internal/ws/broadcast")
            .with_timeout(Duration::from_secs(1));
        let publisher = HttpEventPublisher::new(config).expect("publisher");

        let result = publisher.publish(&Event::new(ORDER_ADDED)).await;

        assert!(matches!(result, Err(PublishError::Transport(_))));
    }
}
