use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use super::types::{ConnectionId, OutboundMessage};

/// Close code sent when the client tears down a connection
pub const NORMAL_CLOSURE: u16 = 1000;

const NO_STATUS_RECEIVED: u16 = 1005;

/// Lifecycle callbacks reported by a connection, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened,
    Text(String),
    Closing { code: u16, reason: String },
    /// The server finished a clean close.
    Closed,
    Failed(String),
}

pub type EventSink = mpsc::UnboundedSender<(ConnectionId, ConnectionEvent)>;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionCommand {
    Send(OutboundMessage),
    Close(u16),
    Cancel,
}

/// Handle to one physical connection.
///
/// Dropping every handle stops the connection task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<ConnectionCommand>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns false when the connection task is gone
    pub fn send(&self, msg: OutboundMessage) -> bool {
        self.tx.send(ConnectionCommand::Send(msg)).is_ok()
    }

    pub fn close(&self, code: u16) {
        let _ = self.tx.send(ConnectionCommand::Close(code));
    }

    /// Stop the connection task without waiting for the close handshake
    pub fn cancel(&self) {
        let _ = self.tx.send(ConnectionCommand::Cancel);
    }
}

/// Opens connections to the signaling endpoint.
///
/// `open` must not block: the connection is established in the background
/// and reports through `events`, tagged with `id`.
pub trait Connector: Send + 'static {
    fn open(&self, url: &str, id: ConnectionId, events: EventSink) -> ConnectionHandle;
}

/// [`Connector`] backed by tokio-tungstenite
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    dial_delay: Duration,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait before every dial, so a server that keeps refusing connections
    /// is not hammered in a tight loop.
    #[must_use]
    pub fn with_dial_delay(mut self, delay: Duration) -> Self {
        self.dial_delay = delay;
        self
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &str, id: ConnectionId, events: EventSink) -> ConnectionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(
            url.to_string(),
            id,
            self.dial_delay,
            rx,
            events,
        ));
        ConnectionHandle::new(id, tx)
    }
}

async fn run_connection(
    url: String,
    id: ConnectionId,
    dial_delay: Duration,
    mut commands: mpsc::UnboundedReceiver<ConnectionCommand>,
    events: EventSink,
) {
    if !dial_delay.is_zero() {
        tokio::time::sleep(dial_delay).await;
    }

    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            warn!("{}: connecting to {} failed: {}", id, url, e);
            let _ = events.send((id, ConnectionEvent::Failed(e.to_string())));
            return;
        }
    };
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    info!("{}: WebSocket connected to {}", id, url);
    let _ = events.send((id, ConnectionEvent::Opened));

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(ConnectionCommand::Send(msg)) => {
                    debug!("{}: sending {}", id, msg.as_str());
                    if let Err(e) = ws_tx.send(Message::Text(msg.into_inner())).await {
                        warn!("{}: send failed: {}", id, e);
                        let _ = events.send((id, ConnectionEvent::Failed(e.to_string())));
                        break;
                    }
                }
                Some(ConnectionCommand::Close(code)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: Utf8Bytes::from_static(""),
                    };
                    if let Err(e) = ws_tx.send(Message::Close(Some(frame))).await {
                        debug!("{}: close frame not sent: {}", id, e);
                    }
                }
                Some(ConnectionCommand::Cancel) | None => {
                    debug!("{}: cancelled", id);
                    break;
                }
            },

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send((id, ConnectionEvent::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("{}: ignoring {} bytes of binary data", id, data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    debug!("{}: closing {} / {}", id, code, reason);
                    let _ = events.send((id, ConnectionEvent::Closing { code, reason }));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("{}: WebSocket error: {}", id, e);
                    let _ = events.send((id, ConnectionEvent::Failed(e.to_string())));
                    break;
                }
                None => {
                    info!("{}: WebSocket closed", id);
                    let _ = events.send((id, ConnectionEvent::Closed));
                    break;
                }
            }
        }
    }
}
