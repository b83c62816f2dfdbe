use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::actor::{ClientActor, ClientCommand};
use super::config::SignalingConfig;
use super::connection::{Connector, WebSocketConnector};
use super::messages::SignalingMessage;
use super::types::{NetworkEvent, SessionSnapshot, SignalingError, SignalingEvent, SubscriptionId};

/// Accepts outgoing call-signaling messages for transmission
pub trait SignalingMessageSender {
    fn send(&self, message: SignalingMessage);
}

/// Stream of [`SignalingEvent`]s for one subscriber
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    events: async_channel::Receiver<SignalingEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, or `None` once the client has shut down or the
    /// subscription was removed
    pub async fn recv(&self) -> Option<SignalingEvent> {
        self.events.recv().await.ok()
    }

    pub fn try_recv(&self) -> Option<SignalingEvent> {
        self.events.try_recv().ok()
    }

    pub fn into_receiver(self) -> async_channel::Receiver<SignalingEvent> {
        self.events
    }
}

/// Handle to a running signaling client.
///
/// Cheap to clone; all clones talk to the same session. None of the
/// methods block: sends are queued to the client task and reconnects are
/// scheduled there.
#[derive(Clone)]
pub struct SignalingClient {
    tx: mpsc::UnboundedSender<ClientCommand>,
    connected: watch::Receiver<bool>,
    next_subscription: Arc<AtomicU64>,
}

impl SignalingClient {
    /// Start a client over WebSocket. Must be called inside a Tokio runtime.
    pub fn connect(config: SignalingConfig) -> Result<Self, SignalingError> {
        Self::start(config, WebSocketConnector::new())
    }

    /// Start a client with a custom [`Connector`] and dial immediately
    pub fn start(
        config: SignalingConfig,
        connector: impl Connector,
    ) -> Result<Self, SignalingError> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected) = watch::channel(false);

        let actor = ClientActor::new(config, connector, events_tx, connected_tx);
        tokio::spawn(actor.run(rx, events_rx));

        Ok(Self {
            tx,
            connected,
            next_subscription: Arc::new(AtomicU64::new(1)),
        })
    }

    fn command(&self, cmd: ClientCommand) {
        if self.tx.send(cmd).is_err() {
            warn!("Signaling client has shut down, command dropped");
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId::new(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (tx, events) = async_channel::unbounded();
        self.command(ClientCommand::Subscribe { id, tx });
        Subscription { id, events }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.command(ClientCommand::Unsubscribe(id));
    }

    /// Send a call-signaling message, queueing it until the session is ready
    pub fn send_signaling_message(&self, message: SignalingMessage) {
        self.command(ClientCommand::SendSignaling(message));
    }

    /// Join a room; `session` is the session id issued by the backend.
    ///
    /// Re-joining the room the session is already in only re-emits
    /// [`SignalingEvent::RoomJoined`].
    pub fn join_room(&self, room_token: impl Into<String>, session: impl Into<String>) {
        self.command(ClientCommand::JoinRoom {
            room_token: room_token.into(),
            session: session.into(),
        });
    }

    /// Leave the current room
    pub fn leave_room(&self, session: impl Into<String>) {
        self.join_room("", session);
    }

    pub fn send_bye(&self) {
        self.command(ClientCommand::SendBye);
    }

    /// Forget the resume id so the next hello re-authenticates
    pub fn clear_resume_id(&self) {
        self.command(ClientCommand::ClearResumeId);
    }

    pub fn on_network_event(&self, event: NetworkEvent) {
        self.command(ClientCommand::Network(event));
    }

    /// Forward connectivity changes from an external observer
    pub fn observe_connectivity(&self, mut events: mpsc::Receiver<NetworkEvent>) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!("Network event: {:?}", event);
                client.on_network_event(event);
            }
        })
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Watch channel that follows the connected flag
    pub fn connection_state(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SignalingError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ClientCommand::Snapshot { reply })
            .map_err(|_| SignalingError::ActorClosed)?;
        rx.await.map_err(|_| SignalingError::ActorClosed)
    }

    pub async fn session_id(&self) -> Result<String, SignalingError> {
        Ok(self.snapshot().await?.session_id)
    }

    pub async fn has_mcu(&self) -> Result<bool, SignalingError> {
        Ok(self.snapshot().await?.has_mcu)
    }

    /// Display name announced for `session_id`, empty when unknown
    pub async fn display_name_for_session(
        &self,
        session_id: impl Into<String>,
    ) -> Result<String, SignalingError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ClientCommand::DisplayName {
                session_id: session_id.into(),
                reply,
            })
            .map_err(|_| SignalingError::ActorClosed)?;
        rx.await.map_err(|_| SignalingError::ActorClosed)
    }

    /// Say bye if connected, close the connection and stop the client task
    pub fn shutdown(&self) {
        self.command(ClientCommand::Shutdown);
    }
}

impl SignalingMessageSender for SignalingClient {
    fn send(&self, message: SignalingMessage) {
        self.send_signaling_message(message);
    }
}
