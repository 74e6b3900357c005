//! Process-wide connection manager.
//!
//! A [`ConnectionManager`] multiplexes any number of subscribers over at
//! most one physical event channel. All state transitions run on a single
//! task that owns the [`GlobalConnection`]; the public operations only
//! enqueue commands and return immediately. Transport progress and timers
//! (keepalive, reconnect, teardown grace) feed the same task, so every
//! transition is atomic and listeners see events in registration order.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ordercast::{now_millis, Event};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backoff::ReconnectBackoff;
use super::config::ManagerConfig;
use super::error::WsError;
use super::state::{ConnectionState, ManagerStats, SharedState};
use super::subscriber::{
    CloseHandler, ErrorHandler, MessageHandler, OpenHandler, Subscriber, SubscriptionHandle,
};
use super::transport::{
    ChannelEvent, ChannelHandle, ChannelSignal, ChannelSink, CloseInfo, Transport,
    TungsteniteTransport,
};

/// Requests from manager handles.
enum Command {
    Register { id: u64, subscriber: Subscriber },
    Unregister { id: u64 },
    Send(String),
}

/// Timer firings. Reconnect and grace timers carry the token they were
/// started with so a firing that raced a cancellation is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Keepalive,
    Reconnect(u64),
    GraceElapsed(u64),
}

/// A one-shot timer that can be cancelled before it fires.
struct PendingTimer {
    token: u64,
    task: JoinHandle<()>,
}

impl PendingTimer {
    fn cancel(self) {
        self.task.abort();
    }
}

/// The channel currently owned by the manager.
struct ActiveChannel {
    id: u64,
    handle: ChannelHandle,
}

/// Handle to the process-wide connection manager.
///
/// Cloning is cheap; every clone drives the same channel. The state machine
/// starts on the first registration and stops once every clone is dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ManagerConfig,
    transport: Arc<dyn Transport>,
    shared: Arc<SharedState>,
    next_subscriber_id: AtomicU64,
    runtime: Handle,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a manager that opens WebSocket channels.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no Tokio runtime
    /// is running.
    pub fn new(config: ManagerConfig) -> Result<Self, WsError> {
        Self::with_transport(config, TungsteniteTransport)
    }

    /// Creates a manager with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no Tokio runtime
    /// is running.
    pub fn with_defaults() -> Result<Self, WsError> {
        Self::new(ManagerConfig::default())
    }

    /// Creates a manager for the given page origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin cannot be turned into a relay endpoint
    /// or no Tokio runtime is running.
    pub fn with_origin(origin: impl Into<String>) -> Result<Self, WsError> {
        Self::new(ManagerConfig::new(origin))
    }

    /// Creates a manager that opens channels through `transport`.
    ///
    /// The manager's state machine runs on the Tokio runtime current at
    /// construction.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::InvalidConfig`] if the configuration is invalid,
    /// or [`WsError::NoRuntime`] if called outside a Tokio runtime.
    pub fn with_transport(
        config: ManagerConfig,
        transport: impl Transport,
    ) -> Result<Self, WsError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| WsError::NoRuntime(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                transport: Arc::new(transport),
                shared: Arc::new(SharedState::default()),
                next_subscriber_id: AtomicU64::new(1),
                runtime,
                commands: Mutex::new(None),
            }),
        })
    }

    /// Returns the manager configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Registers a subscriber and makes sure a channel is open or on its way.
    ///
    /// Returns immediately; the channel may still be connecting.
    pub fn register(&self, subscriber: Subscriber) -> SubscriptionHandle {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.dispatch(Command::Register { id, subscriber });
        SubscriptionHandle::new(id)
    }

    /// Removes every callback of a registration.
    ///
    /// When no listener remains the channel is closed after the grace
    /// period, unless another registration arrives first.
    pub fn unregister(&self, handle: SubscriptionHandle) {
        self.dispatch(Command::Unregister { id: handle.id() });
    }

    /// Sends a message over the open channel.
    ///
    /// Sends are fire-and-forget and never queued for later delivery.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::NotConnected`] (and logs a warning) if the channel
    /// is not open, or [`WsError::Serialization`] if `message` cannot be
    /// serialized.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), WsError> {
        let state = self.state();
        if state != ConnectionState::Open {
            warn!(%state, "send called but event channel is not open");
            return Err(WsError::NotConnected);
        }

        let json =
            serde_json::to_string(message).map_err(|e| WsError::Serialization(e.to_string()))?;
        self.dispatch(Command::Send(json));
        Ok(())
    }

    /// Returns true if the channel is open right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state()
    }

    /// Returns the number of registered listeners as last seen by the state
    /// machine.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.shared.listeners()
    }

    /// Returns a snapshot of the manager counters.
    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        self.inner.shared.snapshot()
    }

    /// Hands `command` to the state machine, starting it first if it is not
    /// running. A state machine whose runtime shut down is replaced.
    fn dispatch(&self, command: Command) {
        let mut commands = self
            .inner
            .commands
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let command = match commands.as_ref() {
            Some(tx) => match tx.send(command) {
                Ok(()) => return,
                Err(mpsc::error::SendError(command)) => {
                    warn!("connection manager stopped; restarting");
                    command
                }
            },
            None => command,
        };

        let tx = self.start();
        if tx.send(command).is_err() {
            error!("connection manager failed to start; dropping command");
        }
        *commands = Some(tx);
    }

    /// Spawns the state machine on the caller's runtime, or on the runtime
    /// the manager was built on.
    fn start(&self) -> mpsc::UnboundedSender<Command> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let connection = GlobalConnection {
            backoff: ReconnectBackoff::from_config(&self.inner.config),
            config: self.inner.config.clone(),
            transport: Arc::clone(&self.inner.transport),
            shared: Arc::clone(&self.inner.shared),
            state: ConnectionState::Idle,
            channel: None,
            next_channel_id: 0,
            reconnect_attempts: 0,
            listeners: BTreeMap::new(),
            open_callbacks: BTreeMap::new(),
            close_callbacks: BTreeMap::new(),
            error_callbacks: BTreeMap::new(),
            keepalive: None,
            reconnect: None,
            grace: None,
            next_timer_token: 0,
            signal_tx,
            timer_tx,
        };

        let runtime = Handle::try_current().unwrap_or_else(|_| self.inner.runtime.clone());
        runtime.spawn(connection.run(command_rx, signal_rx, timer_rx));
        debug!("connection manager started");
        command_tx
    }
}

/// Clears the mirrored state when the state machine task ends.
struct ResetOnExit(Arc<SharedState>);

impl Drop for ResetOnExit {
    fn drop(&mut self) {
        self.0.reset();
    }
}

/// Process-wide connection state, owned by the state machine task.
struct GlobalConnection {
    config: ManagerConfig,
    backoff: ReconnectBackoff,
    transport: Arc<dyn Transport>,
    shared: Arc<SharedState>,

    state: ConnectionState,
    channel: Option<ActiveChannel>,
    next_channel_id: u64,
    reconnect_attempts: u32,

    listeners: BTreeMap<u64, MessageHandler>,
    open_callbacks: BTreeMap<u64, OpenHandler>,
    close_callbacks: BTreeMap<u64, CloseHandler>,
    error_callbacks: BTreeMap<u64, ErrorHandler>,

    keepalive: Option<JoinHandle<()>>,
    reconnect: Option<PendingTimer>,
    grace: Option<PendingTimer>,
    next_timer_token: u64,

    signal_tx: mpsc::UnboundedSender<ChannelSignal>,
    timer_tx: mpsc::UnboundedSender<Timer>,
}

impl GlobalConnection {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: mpsc::UnboundedReceiver<ChannelSignal>,
        mut timers: mpsc::UnboundedReceiver<Timer>,
    ) {
        // Also fires when the runtime drops this task mid-flight.
        let _reset = ResetOnExit(Arc::clone(&self.shared));

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(signal) = signals.recv() => self.handle_signal(signal),
                Some(timer) = timers.recv() => self.handle_timer(timer),
            }
        }

        self.teardown();
        debug!("connection manager stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Register { id, subscriber } => self.register(id, subscriber),
            Command::Unregister { id } => self.unregister(id),
            Command::Send(json) => self.send(json),
        }
    }

    fn handle_signal(&mut self, signal: ChannelSignal) {
        let current = self.channel.as_ref().map(|channel| channel.id);
        if current != Some(signal.channel_id) {
            debug!(channel = signal.channel_id, "ignoring event from stale channel");
            return;
        }

        match signal.event {
            ChannelEvent::Opened => self.on_open(),
            ChannelEvent::Message(text) => self.on_message(&text),
            ChannelEvent::Error(err) => self.on_error(&err),
            ChannelEvent::Closed(info) => self.on_close(&info),
        }
    }

    fn handle_timer(&mut self, timer: Timer) {
        match timer {
            Timer::Keepalive => self.send_keepalive(),
            Timer::Reconnect(token) => {
                if self.reconnect.as_ref().map(|t| t.token) != Some(token) {
                    return;
                }
                self.reconnect = None;
                if self.listeners.is_empty() {
                    return;
                }
                self.connect();
            }
            Timer::GraceElapsed(token) => {
                if self.grace.as_ref().map(|t| t.token) != Some(token) {
                    return;
                }
                self.grace = None;
                if self.listeners.is_empty() {
                    info!("no listeners left; closing event channel");
                    self.teardown();
                }
            }
        }
    }

    fn register(&mut self, id: u64, subscriber: Subscriber) {
        let Subscriber {
            on_message,
            on_open,
            on_close,
            on_error,
        } = subscriber;

        self.listeners.insert(id, on_message);
        if let Some(handler) = on_open {
            self.open_callbacks.insert(id, handler);
        }
        if let Some(handler) = on_close {
            self.close_callbacks.insert(id, handler);
        }
        if let Some(handler) = on_error {
            self.error_callbacks.insert(id, handler);
        }
        self.shared.set_listeners(self.listeners.len());

        if let Some(grace) = self.grace.take() {
            debug!("registration inside grace window; keeping channel");
            grace.cancel();
        }

        debug!(subscriber = id, listeners = self.listeners.len(), "subscriber registered");
        self.ensure_connected();
    }

    fn unregister(&mut self, id: u64) {
        if self.listeners.remove(&id).is_none() {
            debug!(subscriber = id, "unregister for unknown subscriber");
            return;
        }
        self.open_callbacks.remove(&id);
        self.close_callbacks.remove(&id);
        self.error_callbacks.remove(&id);
        self.shared.set_listeners(self.listeners.len());

        debug!(subscriber = id, listeners = self.listeners.len(), "subscriber unregistered");

        if self.listeners.is_empty() {
            if let Some(grace) = self.grace.take() {
                grace.cancel();
            }
            self.grace = Some(self.start_timer(self.config.grace_period, Timer::GraceElapsed));
        }
    }

    fn send(&mut self, json: String) {
        let result = match &self.channel {
            Some(channel) if self.state == ConnectionState::Open => channel.handle.send_text(json),
            _ => {
                warn!(state = %self.state, "dropping outbound message; event channel is not open");
                return;
            }
        };

        if let Err(e) = result {
            warn!(error = %e, "failed to queue outbound message");
            self.notify_error(&e);
        }
    }

    /// Opens a channel unless one is active or a reconnect is already pending.
    fn ensure_connected(&mut self) {
        if self.state.is_active() || self.reconnect.is_some() {
            return;
        }
        self.connect();
    }

    fn connect(&mut self) {
        if self.channel.is_some() && self.state.is_active() {
            return;
        }
        if let Some(stale) = self.channel.take() {
            stale.handle.close();
        }

        self.set_state(ConnectionState::Connecting);
        self.shared.record_connection_attempt();
        self.next_channel_id += 1;
        let channel_id = self.next_channel_id;
        let sink = ChannelSink::new(channel_id, self.signal_tx.clone());

        let opened = self.config.endpoint().and_then(|url| {
            info!(%url, channel = channel_id, "opening event channel");
            self.transport.open(&url, sink)
        });

        match opened {
            Ok(handle) => {
                self.channel = Some(ActiveChannel {
                    id: channel_id,
                    handle,
                });
            }
            Err(err) => {
                warn!(error = %err, "failed to open event channel");
                self.on_error(&err);
                self.on_close(&CloseInfo::abnormal(err.to_string()));
            }
        }
    }

    fn on_open(&mut self) {
        self.set_state(ConnectionState::Open);
        self.reconnect_attempts = 0;
        self.shared.record_connection_opened();
        self.start_keepalive();
        info!("event channel open");

        for (id, handler) in &self.open_callbacks {
            guarded(&self.shared, *id, "open callback", || handler());
        }
    }

    fn on_message(&mut self, text: &str) {
        self.shared.record_message_received();

        let event = match Event::parse(text) {
            Ok(event) => event,
            Err(e) => {
                self.shared.record_message_dropped();
                warn!(error = %e, "dropping malformed event");
                return;
            }
        };

        debug!(kind = %event.kind, listeners = self.listeners.len(), "dispatching event");
        for (id, listener) in &self.listeners {
            guarded(&self.shared, *id, "listener", || listener(&event));
        }
    }

    fn on_error(&mut self, err: &WsError) {
        warn!(error = %err, "event channel error");
        if self.state == ConnectionState::Connecting {
            self.set_state(ConnectionState::Errored);
        }
        self.notify_error(err);
    }

    fn notify_error(&self, err: &WsError) {
        for (id, handler) in &self.error_callbacks {
            guarded(&self.shared, *id, "error callback", || handler(err));
        }
    }

    fn on_close(&mut self, info: &CloseInfo) {
        self.channel = None;
        self.stop_keepalive();
        self.set_state(ConnectionState::Closed);
        warn!(code = ?info.code, reason = %info.reason, "event channel closed");

        for (id, handler) in &self.close_callbacks {
            guarded(&self.shared, *id, "close callback", || handler(info));
        }

        if self.config.auto_reconnect && !self.listeners.is_empty() {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        let Some(delay) = self.backoff.next_delay(self.reconnect_attempts) else {
            warn!(
                attempts = self.reconnect_attempts,
                "reconnect attempts exhausted; waiting for a new registration"
            );
            self.reconnect_attempts = 0;
            self.set_state(ConnectionState::Idle);
            return;
        };

        self.reconnect_attempts += 1;
        self.shared.record_reconnect_scheduled();
        info!(
            ?delay,
            attempt = self.reconnect_attempts,
            "scheduling reconnect"
        );

        if let Some(pending) = self.reconnect.take() {
            pending.cancel();
        }
        self.reconnect = Some(self.start_timer(delay, Timer::Reconnect));
    }

    fn send_keepalive(&mut self) {
        if self.state != ConnectionState::Open {
            return;
        }

        match Event::ping(now_millis()).to_json() {
            Ok(json) => self.send(json),
            Err(e) => warn!(error = %e, "failed to encode keepalive"),
        }
    }

    fn start_keepalive(&mut self) {
        self.stop_keepalive();

        let period = self.config.keepalive_interval;
        let timers = self.timer_tx.clone();
        self.keepalive = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if timers.send(Timer::Keepalive).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_keepalive(&mut self) {
        if let Some(task) = self.keepalive.take() {
            task.abort();
        }
    }

    fn start_timer(&mut self, delay: Duration, timer: fn(u64) -> Timer) -> PendingTimer {
        self.next_timer_token += 1;
        let token = self.next_timer_token;
        let timers = self.timer_tx.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = timers.send(timer(token));
        });

        PendingTimer { token, task }
    }

    /// Closes the channel, cancels every timer and resets the counters.
    fn teardown(&mut self) {
        if let Some(grace) = self.grace.take() {
            grace.cancel();
        }
        if let Some(pending) = self.reconnect.take() {
            pending.cancel();
        }
        self.stop_keepalive();

        if let Some(channel) = self.channel.take() {
            self.set_state(ConnectionState::Closing);
            debug!(channel = channel.id, "closing event channel");
            channel.handle.close();
        }

        self.reconnect_attempts = 0;
        self.set_state(ConnectionState::Idle);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "connection state changed");
        }
        self.state = state;
        self.shared.set_state(state);
    }
}

/// Runs a subscriber callback, containing any panic it raises.
fn guarded(shared: &SharedState, id: u64, what: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        shared.record_listener_failure();
        error!(subscriber = id, "{} panicked", what);
    }
}
