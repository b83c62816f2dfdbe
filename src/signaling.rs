//! Resumable WebSocket signaling client for call sessions and rooms

mod actor;
mod client;
mod config;
mod connection;
mod messages;
mod participants;
mod types;

pub use client::{SignalingClient, SignalingMessageSender, Subscription};
pub use config::{PROTOCOL_VERSION, SignalingConfig};
pub use connection::{
    ConnectionCommand, ConnectionEvent, ConnectionHandle, Connector, EventSink, NORMAL_CLOSURE,
    WebSocketConnector,
};
pub use messages::{ClientMessage, JoinEntry, ServerMessage, SignalingMessage, decode};
pub use participants::ParticipantDirectory;
pub use types::{
    ActorType, ConnectionId, NetworkEvent, OutboundMessage, Participant, SessionSnapshot,
    SignalingError, SignalingEvent, SubscriptionId,
};
