use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::config::SignalingConfig;
use super::connection::{ConnectionEvent, ConnectionHandle, Connector, EventSink, NORMAL_CLOSURE};
use super::messages::{
    self, CallMessageBody, ClientMessage, ERROR_HELLO_EXPECTED, ERROR_NO_SUCH_SESSION,
    ErrorBody, HelloResponse, RoomBody, RoomEvent, ServerMessage, SignalingMessage,
    TARGET_PARTICIPANTS, TARGET_ROOM,
};
use super::participants::ParticipantDirectory;
use super::types::{
    ConnectionId, NetworkEvent, OutboundMessage, SessionSnapshot, SignalingEvent, SubscriptionId,
};

/// Commands sent to the client actor
pub(crate) enum ClientCommand {
    SendSignaling(SignalingMessage),
    JoinRoom {
        room_token: String,
        session: String,
    },
    SendBye,
    Network(NetworkEvent),
    ClearResumeId,
    Subscribe {
        id: SubscriptionId,
        tx: async_channel::Sender<SignalingEvent>,
    },
    Unsubscribe(SubscriptionId),
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    DisplayName {
        session_id: String,
        reply: oneshot::Sender<String>,
    },
    Shutdown,
}

#[derive(Debug, Default)]
struct SessionState {
    resume_id: String,
    session_id: String,
    user_id: Option<String>,
    has_mcu: bool,
    connected: bool,
    reconnecting: bool,
    /// Set by a server `bye`; a clean close afterwards is expected.
    terminated: bool,
    current_room_token: String,
}

/// Owns the session state, the participant directory and the outbound
/// queue. Every mutation happens on the actor task, so a send-gating
/// decision can never interleave with a hello drain.
pub(crate) struct ClientActor<C> {
    config: SignalingConfig,
    connector: C,
    events_tx: EventSink,
    state: SessionState,
    queue: Vec<OutboundMessage>,
    participants: ParticipantDirectory,
    current: Option<ConnectionHandle>,
    last_connection_id: u64,
    subscribers: Vec<(SubscriptionId, async_channel::Sender<SignalingEvent>)>,
    connected_tx: watch::Sender<bool>,
}

impl<C: Connector> ClientActor<C> {
    pub(crate) fn new(
        config: SignalingConfig,
        connector: C,
        events_tx: EventSink,
        connected_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            config,
            connector,
            events_tx,
            state: SessionState::default(),
            queue: Vec::new(),
            participants: ParticipantDirectory::new(),
            current: None,
            last_connection_id: 0,
            subscribers: Vec::new(),
            connected_tx,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ClientCommand>,
        mut events: mpsc::UnboundedReceiver<(ConnectionId, ConnectionEvent)>,
    ) {
        self.restart();

        loop {
            tokio::select! {
                biased;

                Some((id, event)) = events.recv() => {
                    self.handle_connection_event(id, event);
                }

                cmd = commands.recv() => match cmd {
                    Some(ClientCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
            }
        }

        self.shutdown();
    }

    // -----------------------------------------------------------------------
    // Reconnect state machine
    // -----------------------------------------------------------------------

    fn restart(&mut self) {
        self.state.reconnecting = true;
        self.state.terminated = false;

        if let Some(old) = self.current.take() {
            old.close(NORMAL_CLOSURE);
            old.cancel();
        }

        self.last_connection_id += 1;
        let id = ConnectionId::new(self.last_connection_id);
        info!("{}: connecting to {}", id, self.config.url);
        let handle = self
            .connector
            .open(&self.config.url, id, self.events_tx.clone());
        self.current = Some(handle);
    }

    fn is_current(&self, id: ConnectionId) -> bool {
        self.current.as_ref().is_some_and(|handle| handle.id() == id)
    }

    pub(crate) fn handle_connection_event(&mut self, id: ConnectionId, event: ConnectionEvent) {
        if !self.is_current(id) {
            debug!("{}: ignoring {:?} from superseded connection", id, event);
            return;
        }

        match event {
            ConnectionEvent::Opened => self.send_hello(),
            ConnectionEvent::Text(text) => self.dispatch(&text),
            ConnectionEvent::Closing { code, reason } => {
                debug!("{}: server is closing: {} / {}", id, code, reason);
            }
            ConnectionEvent::Closed if self.state.terminated => {
                info!("{}: closed after bye", id);
                self.current = None;
            }
            ConnectionEvent::Closed => self.handle_failure(id, "closed by server"),
            ConnectionEvent::Failed(reason) => self.handle_failure(id, &reason),
        }
    }

    fn handle_failure(&mut self, id: ConnectionId, reason: &str) {
        warn!("{}: connection failed: {}", id, reason);

        if let Some(handle) = self.current.take() {
            handle.close(NORMAL_CLOSURE);
            handle.cancel();
        }
        self.set_connected(false);
        if !self.queue.is_empty() {
            // Frames queued against a connection that never completed its
            // hello are not replayed on the next one.
            warn!("{}: dropping {} queued messages", id, self.queue.len());
            self.queue.clear();
        }

        self.restart();
    }

    fn send_hello(&mut self) {
        let hello = if self.state.resume_id.is_empty() {
            ClientMessage::hello(&self.config)
        } else {
            ClientMessage::resume(&self.config.protocol_version, &self.state.resume_id)
        };

        match hello.encode() {
            Ok(frame) => self.send_now(frame),
            Err(e) => error!("Failed to serialize hello: {}", e),
        }
    }

    fn set_connected(&mut self, connected: bool) {
        self.state.connected = connected;
        self.connected_tx.send_replace(connected);
    }

    fn is_ready(&self) -> bool {
        self.state.connected && !self.state.reconnecting
    }

    // -----------------------------------------------------------------------
    // Dispatcher
    // -----------------------------------------------------------------------

    fn dispatch(&mut self, text: &str) {
        debug!("received {}", text);

        let message = match messages::decode(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                return;
            }
        };

        match message {
            ServerMessage::Hello { hello } => self.process_hello(hello),
            ServerMessage::Error { error } => self.process_error(error),
            ServerMessage::Room { room } => self.process_room(room),
            ServerMessage::Event { event } => self.process_event(event),
            ServerMessage::Message { message } => self.process_call_message(message),
            ServerMessage::Bye { .. } => {
                info!("Session ended by server");
                self.state.resume_id.clear();
                self.state.terminated = true;
                self.set_connected(false);
            }
            ServerMessage::Unknown => debug!("Ignoring message of unknown type"),
        }
    }

    fn process_hello(&mut self, hello: HelloResponse) {
        let old_resume_id = std::mem::take(&mut self.state.resume_id);
        self.state.has_mcu = hello.has_mcu();
        self.state.resume_id = hello.resumeid;
        self.state.session_id = hello.sessionid;
        self.state.user_id = hello.userid;
        self.state.reconnecting = false;
        self.set_connected(true);

        info!(
            "Signaling session {} established (mcu: {})",
            self.state.session_id, self.state.has_mcu
        );

        let queued = std::mem::take(&mut self.queue);
        if !queued.is_empty() {
            debug!("Flushing {} queued messages", queued.len());
        }
        for frame in queued {
            self.send_now(frame);
        }

        if old_resume_id.is_empty() {
            self.state.current_room_token.clear();
        } else {
            self.emit(SignalingEvent::SessionResumed { old_resume_id });
        }

        if !self.state.current_room_token.is_empty() {
            let room_token = self.state.current_room_token.clone();
            self.emit(SignalingEvent::RoomStillJoined { room_token });
        }
    }

    fn process_error(&mut self, error: ErrorBody) {
        warn!("Received error {}: {}", error.code, error.message);

        match error.code.as_str() {
            ERROR_NO_SUCH_SESSION => {
                info!("Resume id {} expired", self.state.resume_id);
                self.state.resume_id.clear();
                self.state.current_room_token.clear();
                self.restart();
            }
            ERROR_HELLO_EXPECTED => self.restart(),
            _ => {}
        }
    }

    fn process_room(&mut self, room: RoomBody) {
        self.state.current_room_token = room.roomid;

        if !self.state.current_room_token.is_empty() {
            let room_token = self.state.current_room_token.clone();
            self.emit(SignalingEvent::RoomJoined { room_token });
        }
    }

    fn process_event(&mut self, event: Map<String, Value>) {
        let target = event
            .get("target")
            .and_then(Value::as_str)
            .map(str::to_owned);

        match target.as_deref() {
            Some(TARGET_ROOM) => match serde_json::from_value(Value::Object(event)) {
                Ok(RoomEvent::Message { message }) => {
                    if message.refresh_requested() {
                        self.emit(SignalingEvent::RefreshChat {
                            room_token: message.roomid,
                            internal_user_id: self.config.internal_user_id,
                        });
                    }
                }
                Ok(RoomEvent::Join { join }) => {
                    for entry in &join {
                        self.participants.merge_join(entry);
                    }
                }
                Ok(RoomEvent::Other) => {}
                Err(e) => warn!("Dropping room event: {}", e),
            },
            Some(TARGET_PARTICIPANTS) => self.emit(SignalingEvent::ParticipantsEvent(event)),
            Some(other) => info!("Ignoring event for target {}", other),
            None => warn!("Received event without target"),
        }
    }

    fn process_call_message(&mut self, body: CallMessageBody) {
        let Some(mut message) = body.data else {
            debug!("Ignoring call message without data");
            return;
        };

        if !message.has_sender() {
            message.from = body.sender.and_then(|sender| sender.sessionid);
        }

        self.emit(SignalingEvent::SignalingMessage(message));
    }

    fn emit(&mut self, event: SignalingEvent) {
        self.subscribers
            .retain(|(id, tx)| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!("Dropping closed subscription {}", id);
                    false
                }
            });
    }

    // -----------------------------------------------------------------------
    // Caller commands
    // -----------------------------------------------------------------------

    pub(crate) fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::SendSignaling(message) => {
                match ClientMessage::call(message).encode() {
                    Ok(frame) => self.send_or_queue(frame),
                    Err(e) => error!("Failed to serialize signaling message: {}", e),
                }
            }

            ClientCommand::JoinRoom {
                room_token,
                session,
            } => {
                debug!("Joining room {} with session {}", room_token, session);
                let frame = match ClientMessage::join_room(&room_token, &session).encode() {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to serialize room request: {}", e);
                        return;
                    }
                };

                if !self.is_ready() {
                    self.queue.push(frame);
                } else if !room_token.is_empty() && room_token == self.state.current_room_token {
                    self.emit(SignalingEvent::RoomJoined { room_token });
                } else {
                    self.send_now(frame);
                }
            }

            ClientCommand::SendBye => {
                if self.is_ready() {
                    match ClientMessage::bye().encode() {
                        Ok(frame) => self.send_now(frame),
                        Err(e) => error!("Failed to serialize bye: {}", e),
                    }
                }
            }

            ClientCommand::Network(NetworkEvent::Connected) => {
                if !self.state.connected {
                    info!("Network restored, reconnecting");
                    self.restart();
                }
            }

            ClientCommand::Network(NetworkEvent::Disconnected) => {
                debug!("Network lost");
            }

            ClientCommand::ClearResumeId => self.state.resume_id.clear(),

            ClientCommand::Subscribe { id, tx } => self.subscribers.push((id, tx)),

            ClientCommand::Unsubscribe(id) => {
                self.subscribers.retain(|(sub_id, _)| *sub_id != id);
            }

            ClientCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }

            ClientCommand::DisplayName { session_id, reply } => {
                let _ = reply.send(self.participants.display_name(&session_id).to_owned());
            }

            ClientCommand::Shutdown => self.shutdown(),
        }
    }

    fn send_or_queue(&mut self, frame: OutboundMessage) {
        if self.is_ready() {
            self.send_now(frame);
        } else {
            self.queue.push(frame);
        }
    }

    fn send_now(&self, frame: OutboundMessage) {
        match &self.current {
            Some(handle) => {
                if !handle.send(frame) {
                    warn!("{}: connection task stopped, message dropped", handle.id());
                }
            }
            None => warn!("No active connection, message dropped"),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.state.session_id.clone(),
            resume_id: self.state.resume_id.clone(),
            user_id: self.state.user_id.clone(),
            has_mcu: self.state.has_mcu,
            connected: self.state.connected,
            reconnecting: self.state.reconnecting,
            current_room_token: self.state.current_room_token.clone(),
            queued_messages: self.queue.len(),
        }
    }

    fn shutdown(&mut self) {
        if self.is_ready() {
            if let Ok(frame) = ClientMessage::bye().encode() {
                self.send_now(frame);
            }
        }
        if let Some(handle) = self.current.take() {
            handle.close(NORMAL_CLOSURE);
            handle.cancel();
        }
        self.set_connected(false);
        info!("Signaling client stopped");
    }
}
