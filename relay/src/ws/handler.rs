//! WebSocket connection handler.
//!
//! Provides the upgrade handler and the per-connection loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use ordercast::Event;
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::metrics::RelayMetrics;
use crate::state::AppState;

/// WebSocket upgrade handler.
///
/// Upgrades an HTTP connection to an event channel.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Runs one event channel until the client goes away.
async fn handle_connection(socket: WebSocket, state: AppState) {
    let metrics = Arc::clone(state.relay.metrics());
    metrics.record_connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (connection, mut rx) = Connection::channel(state.config.outbound_buffer);
    let connection_id = connection.id();

    state.relay.attach(Arc::new(connection)).await;
    info!(connection = connection_id, "event channel opened");

    // Drains the outbound queue so a slow client only backs up its own queue.
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender
                .send(Message::Text(frame.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                warn!(connection = connection_id, "WebSocket error: {}", e);
                metrics.record_error();
                break;
            }
        };

        match msg {
            Message::Text(text) => handle_text_message(connection_id, text.as_str(), &metrics),
            Message::Close(_) => {
                debug!(connection = connection_id, "close requested");
                break;
            }
            // Protocol-level pings are answered by the WebSocket layer.
            _ => {}
        }
    }

    state.relay.detach(connection_id).await;
    metrics.record_connection_closed();
    sender_task.abort();

    info!(connection = connection_id, "event channel closed");
}

/// Handles a text frame from a client.
///
/// Clients only ever send keepalives; anything else is logged and ignored.
fn handle_text_message(connection_id: u64, text: &str, metrics: &RelayMetrics) {
    metrics.record_message_received();

    match Event::parse(text) {
        Ok(event) if event.is_ping() => {
            metrics.record_ping();
            debug!(connection = connection_id, "keepalive received");
        }
        Ok(event) => {
            debug!(connection = connection_id, kind = %event.kind, "ignoring client event");
        }
        Err(e) => {
            debug!(connection = connection_id, error = %e, "ignoring malformed client frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_text_message_counts_ping() {
        let metrics = RelayMetrics::new();

        handle_text_message(1, r#"{"type":"__ping__","ts":1}"#, &metrics);

        assert_eq!(metrics.messages_received(), 1);
        assert_eq!(metrics.pings_received(), 1);
    }

    #[test]
    fn test_handle_text_message_ignores_other_frames() {
        let metrics = RelayMetrics::new();

        handle_text_message(1, r#"{"type":"hello"}"#, &metrics);
        handle_text_message(1, "garbage", &metrics);

        assert_eq!(metrics.messages_received(), 2);
        assert_eq!(metrics.pings_received(), 0);
        assert_eq!(metrics.errors(), 0);
    }
}
