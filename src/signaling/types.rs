use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

use super::messages::SignalingMessage;

/// Signaling client errors
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to serialize message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("signaling client has shut down")]
    ActorClosed,
}

/// Identity of one physical connection attempt.
///
/// Ids increase monotonically per client, so a handle that reports with an
/// id other than the current one belongs to a superseded connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opaque token returned by `subscribe`, used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Users,
    Guests,
}

/// A room participant as announced by the backend's join events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub actor_type: ActorType,
    /// Not provided by the backend for guests.
    pub actor_id: Option<String>,
    pub display_name: Option<String>,
}

/// Events delivered to subscribers, in the order the client produced them
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// A hello completed using a previously issued resume id.
    SessionResumed { old_resume_id: String },

    /// The session came back with a room still joined.
    RoomStillJoined { room_token: String },

    /// The backend confirmed (or the client already had) the room join.
    RoomJoined { room_token: String },

    /// The backend asks clients in the room to refetch the chat.
    RefreshChat {
        room_token: String,
        internal_user_id: u64,
    },

    /// A complete call-signaling message from another participant.
    SignalingMessage(SignalingMessage),

    /// Raw `participants` event payload for participant-state processing.
    ParticipantsEvent(Map<String, Value>),
}

/// Connectivity notifications pushed by an external network observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Connected,
    Disconnected,
}

/// Point-in-time copy of the resumable session state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub resume_id: String,
    pub user_id: Option<String>,
    pub has_mcu: bool,
    pub connected: bool,
    pub reconnecting: bool,
    pub current_room_token: String,
    pub queued_messages: usize,
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
///
/// Queued frames are replayed verbatim, so they are kept in their wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}
