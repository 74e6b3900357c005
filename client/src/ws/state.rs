//! Connection state and manager statistics.
//!
//! The manager's state machine owns the authoritative [`ConnectionState`];
//! [`SharedState`] mirrors it with atomics so handles can poll it without
//! waiting on the state machine.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

/// Lifecycle state of the process-wide event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// No channel and nothing pending.
    Idle = 0,
    /// A channel is being opened.
    Connecting = 1,
    /// The channel is open.
    Open = 2,
    /// The channel is being closed on purpose.
    Closing = 3,
    /// The channel closed; a reconnect may be pending.
    Closed = 4,
    /// The channel failed before it opened.
    Errored = 5,
}

impl ConnectionState {
    /// Returns true if a channel is open or being opened.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::Connecting)
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            4 => Self::Closed,
            5 => Self::Errored,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Point-in-time counters for a connection manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Physical connection attempts, including failed ones.
    pub connection_attempts: u64,
    /// Successful opens.
    pub connections_opened: u64,
    /// Reconnects scheduled after a close.
    pub reconnects_scheduled: u64,
    /// Inbound frames received.
    pub messages_received: u64,
    /// Inbound frames dropped because they failed to parse.
    pub messages_dropped: u64,
    /// Listener or callback invocations that panicked.
    pub listener_failures: u64,
}

/// State mirrored out of the state machine.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    state: AtomicU8,
    listeners: AtomicUsize,
    connection_attempts: AtomicU64,
    connections_opened: AtomicU64,
    reconnects_scheduled: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
    listener_failures: AtomicU64,
}

impl SharedState {
    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn listeners(&self) -> usize {
        self.listeners.load(Ordering::Relaxed)
    }

    pub(crate) fn set_listeners(&self, count: usize) {
        self.listeners.store(count, Ordering::Relaxed);
    }

    /// Marks the state machine as gone: no channel and no listeners.
    pub(crate) fn reset(&self) {
        self.set_state(ConnectionState::Idle);
        self.set_listeners(0);
    }

    pub(crate) fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_listener_failure(&self) {
        self.listener_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ManagerStats {
        ManagerStats {
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
        }
    }
}
