//! Event channel transport.
//!
//! A [`Transport`] opens one physical channel to the relay and reports its
//! progress (open, inbound frames, errors, close) through a [`ChannelSink`].
//! Opening never waits for the handshake: the caller gets a
//! [`ChannelHandle`] immediately and learns the outcome from the sink.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use super::error::WsError;

/// Close code for a connection that dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Details of a channel closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code, if one was received.
    pub code: Option<u16>,
    /// Close reason.
    pub reason: String,
}

impl CloseInfo {
    /// A normal closure.
    #[must_use]
    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: Some(CLOSE_NORMAL),
            reason: reason.into(),
        }
    }

    /// A closure without a close handshake.
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: Some(CLOSE_ABNORMAL),
            reason: reason.into(),
        }
    }
}

impl From<Option<CloseFrame>> for CloseInfo {
    fn from(frame: Option<CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self {
                code: Some(u16::from(frame.code)),
                reason: frame.reason.to_string(),
            },
            None => Self {
                code: None,
                reason: String::new(),
            },
        }
    }
}

/// Progress reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel finished its handshake.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The channel hit an error. A [`ChannelEvent::Closed`] follows if the
    /// channel cannot continue.
    Error(WsError),
    /// The channel is gone.
    Closed(CloseInfo),
}

/// A [`ChannelEvent`] tagged with the channel it came from.
#[derive(Debug)]
pub(crate) struct ChannelSignal {
    pub(crate) channel_id: u64,
    pub(crate) event: ChannelEvent,
}

/// Where a transport reports progress for one channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    channel_id: u64,
    tx: mpsc::UnboundedSender<ChannelSignal>,
}

impl ChannelSink {
    pub(crate) fn new(channel_id: u64, tx: mpsc::UnboundedSender<ChannelSignal>) -> Self {
        Self { channel_id, tx }
    }

    /// Returns the id of the channel this sink reports for.
    #[must_use]
    pub const fn channel_id(&self) -> u64 {
        self.channel_id
    }

    /// Reports an event. Events sent after the manager stopped are dropped.
    pub fn report(&self, event: ChannelEvent) {
        let _ = self.tx.send(ChannelSignal {
            channel_id: self.channel_id,
            event,
        });
    }

    /// Reports a completed handshake.
    pub fn opened(&self) {
        self.report(ChannelEvent::Opened);
    }

    /// Reports an inbound text frame.
    pub fn message(&self, text: impl Into<String>) {
        self.report(ChannelEvent::Message(text.into()));
    }

    /// Reports an error.
    pub fn error(&self, err: WsError) {
        self.report(ChannelEvent::Error(err));
    }

    /// Reports that the channel closed.
    pub fn closed(&self, info: CloseInfo) {
        self.report(ChannelEvent::Closed(info));
    }
}

/// Frames queued for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame.
    Text(String),
    /// Close the channel.
    Close,
}

/// Owner's side of an open or opening channel.
#[derive(Debug)]
pub struct ChannelHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    /// Creates a handle that feeds `outbound`.
    #[must_use]
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            outbound,
            task: None,
        }
    }

    /// Attaches the task driving the channel.
    #[must_use]
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Queues a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Closed`] if the channel task is gone.
    pub fn send_text(&self, text: String) -> Result<(), WsError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| WsError::Closed)
    }

    /// Asks the channel to close. The driving task sends a close frame and
    /// exits on its own.
    pub fn close(self) {
        if self.outbound.send(Outbound::Close).is_err() {
            if let Some(task) = self.task {
                task.abort();
            }
        }
    }
}

/// Opens physical event channels.
pub trait Transport: Send + Sync + 'static {
    /// Starts opening a channel to `url`.
    ///
    /// Must return without waiting for the handshake and report every later
    /// transition through `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot even be started.
    fn open(&self, url: &str, sink: ChannelSink) -> Result<ChannelHandle, WsError>;
}

/// WebSocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl Transport for TungsteniteTransport {
    fn open(&self, url: &str, sink: ChannelSink) -> Result<ChannelHandle, WsError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WsError::Connection(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(run_channel(url.to_string(), sink, rx));

        Ok(ChannelHandle::new(tx).with_task(task))
    }
}

/// Drives one WebSocket connection until it closes.
async fn run_channel(url: String, sink: ChannelSink, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            let err = WsError::Connection(e.to_string());
            sink.error(err.clone());
            sink.closed(CloseInfo::abnormal(err.to_string()));
            return;
        }
    };

    sink.opened();
    let (mut ws_sink, mut source) = ws_stream.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                        let err = WsError::SendFailed(e.to_string());
                        sink.error(err.clone());
                        sink.closed(CloseInfo::abnormal(err.to_string()));
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = ws_sink.send(Message::Close(None)).await;
                    sink.closed(CloseInfo::normal("closed by client"));
                    return;
                }
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => sink.message(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => sink.message(text),
                    Err(_) => debug!("dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    sink.closed(CloseInfo::from(frame));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let err = WsError::from(e);
                    sink.error(err.clone());
                    sink.closed(CloseInfo::abnormal(err.to_string()));
                    return;
                }
                None => {
                    sink.closed(CloseInfo::abnormal("stream ended"));
                    return;
                }
            },
        }
    }
}
