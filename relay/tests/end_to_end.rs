//! End-to-end tests: a real relay, a real client manager, real sockets.

use std::future::Future;
use std::time::Duration;

use ordercast::{Event, ORDER_ADDED, ORDER_STATUS_CHANGED};
use ordercast_client::{ConnectionManager, ManagerConfig, Subscriber};
use ordercast_relay::{
    notify_order_added, notify_order_status_changed, AppState, HttpEventPublisher,
    PublisherConfig, RelayConfig, Server,
};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

struct RunningRelay {
    port: u16,
    state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for RunningRelay {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn start_relay() -> RunningRelay {
    let server = Server::new(RelayConfig::new("127.0.0.1", 0)).expect("server");
    let bound = server.bind().await.expect("bind");
    let port = bound.local_addr().port();
    let state = bound.state().clone();

    let (tx, rx) = oneshot::channel();
    tokio::spawn(bound.serve(async move {
        let _ = rx.await;
    }));

    RunningRelay {
        port,
        state,
        shutdown: Some(tx),
    }
}

fn client_config(port: u16) -> ManagerConfig {
    ManagerConfig::new("http://127.0.0.1")
        .with_relay_port(port)
        .with_reconnect_interval(Duration::from_millis(50))
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn forwarding(tx: mpsc::UnboundedSender<Event>) -> Subscriber {
    Subscriber::new(move |event| {
        let _ = tx.send(event.clone());
    })
}

#[tokio::test]
async fn test_published_order_reaches_registered_client_once() {
    let relay = start_relay().await;
    let manager = ConnectionManager::new(client_config(relay.port)).expect("manager");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = manager.register(forwarding(tx));
    let (client, state) = (&manager, &relay.state);

    eventually("client to connect", || async move { client.is_connected() }).await;
    eventually("relay to attach channel", || async move {
        state.relay.connection_count().await == 1
    })
    .await;

    let url = format!("http://127.0.0.1:{}/internal/ws/broadcast", relay.port);
    let publisher = HttpEventPublisher::new(PublisherConfig::new(url)).expect("publisher");
    notify_order_added(&publisher, "X1", json!({"items": [{"name": "tea"}]})).await;

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event in time")
        .expect("event");
    assert_eq!(event.kind, ORDER_ADDED);
    assert_eq!(event.order_id(), Some("X1"));

    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "event delivered more than once");

    manager.unregister(handle);
    eventually("relay to drop channel", || async move {
        state.relay.connection_count().await == 0
    })
    .await;
}

#[tokio::test]
async fn test_many_subscribers_share_one_channel() {
    let relay = start_relay().await;
    let manager = ConnectionManager::new(client_config(relay.port)).expect("manager");
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();

    let _a = manager.register(forwarding(tx_a));
    let _b = manager.register(forwarding(tx_b));
    let (client, state) = (&manager, &relay.state);

    eventually("relay to attach channel", || async move {
        client.is_connected() && state.relay.connection_count().await == 1
    })
    .await;

    let url = format!("http://127.0.0.1:{}/internal/ws/broadcast", relay.port);
    let publisher = HttpEventPublisher::new(PublisherConfig::new(url)).expect("publisher");
    notify_order_status_changed(&publisher, "X9", "ready", json!({})).await;

    for rx in [&mut rx_a, &mut rx_b] {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("event");
        assert_eq!(event.kind, ORDER_STATUS_CHANGED);
        assert_eq!(event.get("status"), Some(&json!("ready")));
    }

    assert_eq!(relay.state.relay.connection_count().await, 1);
    assert_eq!(manager.stats().connection_attempts, 1);
}

#[tokio::test]
async fn test_keepalive_reaches_relay() {
    let relay = start_relay().await;
    let config = client_config(relay.port).with_keepalive_interval(Duration::from_millis(100));
    let manager = ConnectionManager::new(config).expect("manager");

    let _handle = manager.register(Subscriber::new(|_| {}));
    let state = &relay.state;

    eventually("keepalive", || async move {
        state.relay.metrics().pings_received() >= 1
    })
    .await;
    assert_eq!(relay.state.relay.metrics().events_published(), 0);
}
