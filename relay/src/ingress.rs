//! HTTP endpoints next to the event channel.
//!
//! Producers post events to the internal broadcast ingress; operators poll
//! the health endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ordercast::{Event, ProtocolError};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::relay::PublishReport;
use crate::state::AppState;
use crate::ws::metrics::RelayMetricsSnapshot;

/// Error body returned by the HTTP endpoints.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// A `400 Bad Request`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    /// A `500 Internal Server Error`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        Self::bad_request(err.to_string())
    }
}

/// `POST /internal/ws/broadcast`
///
/// Publishes the posted event to every open channel and answers with the
/// fan-out report. The body must be a JSON object with a string `type`.
pub async fn broadcast(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PublishReport>, ApiError> {
    let Json(value) = body?;
    let event = Event::from_value(value).map_err(|e| {
        warn!(error = %e, "rejecting broadcast request");
        ApiError::from(e)
    })?;

    debug!(kind = %event.kind, "broadcast requested");
    let report = state.relay.publish(&event).await.map_err(|e| {
        error!(error = %e, "broadcast failed");
        ApiError::internal(e.to_string())
    })?;

    Ok(Json(report))
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the server is serving.
    pub status: &'static str,
    /// Open event channels.
    pub connections: usize,
    /// Relay counters.
    pub metrics: RelayMetricsSnapshot,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.relay.connection_count().await,
        metrics: state.relay.metrics().snapshot(),
    })
}
