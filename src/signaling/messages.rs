use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::config::SignalingConfig;
use super::types::{OutboundMessage, SignalingError};

pub const ERROR_NO_SUCH_SESSION: &str = "no_such_session";
pub const ERROR_HELLO_EXPECTED: &str = "hello_expected";

pub const TARGET_ROOM: &str = "room";
pub const TARGET_PARTICIPANTS: &str = "participants";

const FEATURE_MCU: &str = "mcu";

/// Call-signaling payload exchanged between participants (offer, answer,
/// candidate, control messages).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalingMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(rename = "roomType", default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl SignalingMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn has_sender(&self) -> bool {
        self.from.as_deref().is_some_and(|from| !from.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// Messages sent from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Hello { hello: HelloRequest },

    /// Join a room, or leave the current one with an empty `roomid`
    Room { room: RoomRequest },

    Message { message: CallMessageRequest },

    Bye { bye: Map<String, Value> },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HelloRequest {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<HelloAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumeid: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HelloAuth {
    pub url: String,
    pub params: HelloAuthParams,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HelloAuthParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userid: Option<String>,
    pub ticket: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomRequest {
    pub roomid: String,
    pub sessionid: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallMessageRequest {
    pub recipient: Recipient,
    pub data: SignalingMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(rename = "type")]
    pub kind: String,
    pub sessionid: String,
}

impl ClientMessage {
    /// Full hello carrying the user's credentials
    pub fn hello(config: &SignalingConfig) -> Self {
        ClientMessage::Hello {
            hello: HelloRequest {
                version: config.protocol_version.clone(),
                auth: Some(HelloAuth {
                    url: config.backend_url.clone(),
                    params: HelloAuthParams {
                        userid: config.user_id.clone(),
                        ticket: config.ticket.clone(),
                    },
                }),
                resumeid: None,
            },
        }
    }

    /// Hello that resumes an existing server-side session
    pub fn resume(version: &str, resume_id: &str) -> Self {
        ClientMessage::Hello {
            hello: HelloRequest {
                version: version.to_string(),
                auth: None,
                resumeid: Some(resume_id.to_string()),
            },
        }
    }

    pub fn join_room(room_token: &str, session: &str) -> Self {
        ClientMessage::Room {
            room: RoomRequest {
                roomid: room_token.to_string(),
                sessionid: session.to_string(),
            },
        }
    }

    pub fn call(message: SignalingMessage) -> Self {
        ClientMessage::Message {
            message: CallMessageRequest {
                recipient: Recipient {
                    kind: "session".to_string(),
                    sessionid: message.to.clone().unwrap_or_default(),
                },
                data: message,
            },
        }
    }

    pub fn bye() -> Self {
        ClientMessage::Bye { bye: Map::new() }
    }

    pub fn encode(&self) -> Result<OutboundMessage, SignalingError> {
        serde_json::to_string(self)
            .map(OutboundMessage::from)
            .map_err(SignalingError::Encode)
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// Messages sent from server to client, keyed by the envelope's `type`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Hello { hello: HelloResponse },

    Error { error: ErrorBody },

    Room { room: RoomBody },

    /// Kept as a raw object: `participants` events are forwarded untouched
    Event { event: Map<String, Value> },

    Message { message: CallMessageBody },

    Bye {
        #[serde(default)]
        bye: Option<Value>,
    },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct HelloResponse {
    pub sessionid: String,
    #[serde(default)]
    pub resumeid: String,
    #[serde(default)]
    pub userid: Option<String>,
    #[serde(default)]
    pub server: Option<ServerInfo>,
    #[serde(default)]
    pub mcu: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

impl HelloResponse {
    pub fn has_mcu(&self) -> bool {
        self.mcu.unwrap_or(false)
            || self
                .server
                .as_ref()
                .is_some_and(|server| server.features.iter().any(|f| f == FEATURE_MCU))
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RoomBody {
    #[serde(default)]
    pub roomid: String,
    #[serde(default)]
    pub properties: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct CallMessageBody {
    #[serde(default)]
    pub sender: Option<MessageSender>,
    #[serde(default)]
    pub data: Option<SignalingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct MessageSender {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub sessionid: Option<String>,
    #[serde(default)]
    pub userid: Option<String>,
}

/// `event` payloads addressed to the room, narrowed by their own `type`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RoomEvent {
    Message { message: RoomMessageEvent },

    Join {
        #[serde(default)]
        join: Vec<JoinEntry>,
    },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct RoomMessageEvent {
    #[serde(default)]
    pub roomid: String,
    #[serde(default)]
    pub data: Option<RoomMessageData>,
}

#[derive(Debug, Deserialize)]
pub struct RoomMessageData {
    #[serde(default)]
    pub chat: Option<ChatData>,
}

#[derive(Debug, Deserialize)]
pub struct ChatData {
    #[serde(default)]
    pub refresh: bool,
}

impl RoomMessageEvent {
    pub fn refresh_requested(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|data| data.chat.as_ref())
            .is_some_and(|chat| chat.refresh)
    }
}

#[derive(Debug, Deserialize)]
pub struct JoinEntry {
    /// Entries without one cannot be addressed and are skipped on merge.
    #[serde(default)]
    pub sessionid: Option<String>,
    #[serde(default)]
    pub userid: Option<String>,
    /// Absent for guests.
    #[serde(default)]
    pub user: Option<JoinUser>,
}

#[derive(Debug, Deserialize)]
pub struct JoinUser {
    #[serde(default)]
    pub displayname: Option<String>,
}

pub fn decode(text: &str) -> Result<ServerMessage, SignalingError> {
    serde_json::from_str(text).map_err(SignalingError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_value(msg: &ClientMessage) -> Value {
        serde_json::from_str(msg.encode().unwrap().as_str()).unwrap()
    }

    #[test]
    fn serialize_full_hello() {
        let config = SignalingConfig::new("wss://hpb.example.com/spreed")
            .with_backend_url("https://cloud.example.com/backend")
            .with_user_id("alice")
            .with_ticket("t-123");
        let json = to_value(&ClientMessage::hello(&config));

        assert_eq!(json["type"], "hello");
        assert_eq!(json["hello"]["version"], "1.0");
        assert_eq!(json["hello"]["auth"]["url"], "https://cloud.example.com/backend");
        assert_eq!(json["hello"]["auth"]["params"]["userid"], "alice");
        assert_eq!(json["hello"]["auth"]["params"]["ticket"], "t-123");
        assert!(json["hello"].get("resumeid").is_none());
    }

    #[test]
    fn serialize_guest_hello_omits_userid() {
        let config = SignalingConfig::new("ws://localhost/spreed").with_ticket("t");
        let json = to_value(&ClientMessage::hello(&config));
        assert!(json["hello"]["auth"]["params"].get("userid").is_none());
    }

    #[test]
    fn serialize_resume_hello() {
        let json = to_value(&ClientMessage::resume("1.0", "R1"));
        assert_eq!(json["type"], "hello");
        assert_eq!(json["hello"]["resumeid"], "R1");
        assert!(json["hello"].get("auth").is_none());
    }

    #[test]
    fn serialize_join_room() {
        let json = to_value(&ClientMessage::join_room("T1", "backend-session"));
        assert_eq!(json["type"], "room");
        assert_eq!(json["room"]["roomid"], "T1");
        assert_eq!(json["room"]["sessionid"], "backend-session");
    }

    #[test]
    fn serialize_bye() {
        let text = ClientMessage::bye().encode().unwrap();
        assert_eq!(text.as_str(), r#"{"type":"bye","bye":{}}"#);
    }

    #[test]
    fn serialize_call_message_addresses_recipient() {
        let mut msg = SignalingMessage::new("offer");
        msg.to = Some("peer-session".to_string());
        msg.room_type = Some("video".to_string());
        let json = to_value(&ClientMessage::call(msg));

        assert_eq!(json["type"], "message");
        assert_eq!(json["message"]["recipient"]["type"], "session");
        assert_eq!(json["message"]["recipient"]["sessionid"], "peer-session");
        assert_eq!(json["message"]["data"]["type"], "offer");
        assert_eq!(json["message"]["data"]["roomType"], "video");
        assert!(json["message"]["data"].get("from").is_none());
    }

    #[test]
    fn parse_hello_response() {
        let json = r#"{"type":"hello","hello":{"sessionid":"S1","resumeid":"R1","userid":"alice","server":{"version":"1.2","features":["audio-video-permissions","mcu"]}}}"#;
        let ServerMessage::Hello { hello } = decode(json).unwrap() else {
            panic!("Expected Hello");
        };
        assert_eq!(hello.sessionid, "S1");
        assert_eq!(hello.resumeid, "R1");
        assert_eq!(hello.userid.as_deref(), Some("alice"));
        assert!(hello.has_mcu());
    }

    #[test]
    fn hello_without_mcu_feature() {
        let json = r#"{"type":"hello","hello":{"sessionid":"S1","resumeid":"R1","server":{"features":[]}}}"#;
        let ServerMessage::Hello { hello } = decode(json).unwrap() else {
            panic!("Expected Hello");
        };
        assert!(!hello.has_mcu());
    }

    #[test]
    fn hello_with_mcu_flag() {
        let json = r#"{"type":"hello","hello":{"sessionid":"S1","mcu":true}}"#;
        let ServerMessage::Hello { hello } = decode(json).unwrap() else {
            panic!("Expected Hello");
        };
        assert!(hello.has_mcu());
        assert_eq!(hello.resumeid, "");
    }

    #[test]
    fn hello_without_session_is_malformed() {
        assert!(decode(r#"{"type":"hello","hello":{"resumeid":"R1"}}"#).is_err());
    }

    #[test]
    fn parse_error() {
        let json = r#"{"type":"error","error":{"code":"no_such_session","message":"The session to resume does not exist."}}"#;
        let ServerMessage::Error { error } = decode(json).unwrap() else {
            panic!("Expected Error");
        };
        assert_eq!(error.code, ERROR_NO_SUCH_SESSION);
    }

    #[test]
    fn parse_room() {
        let json = r#"{"type":"room","room":{"roomid":"T1","properties":{"name":"Standup"}}}"#;
        let ServerMessage::Room { room } = decode(json).unwrap() else {
            panic!("Expected Room");
        };
        assert_eq!(room.roomid, "T1");
        assert!(room.properties.is_some());
    }

    #[test]
    fn parse_bye_with_and_without_body() {
        assert!(matches!(
            decode(r#"{"type":"bye","bye":{"reason":"session_expired"}}"#).unwrap(),
            ServerMessage::Bye { .. }
        ));
        assert!(matches!(
            decode(r#"{"type":"bye"}"#).unwrap(),
            ServerMessage::Bye { bye: None }
        ));
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        assert!(matches!(
            decode(r#"{"type":"control","control":{}}"#).unwrap(),
            ServerMessage::Unknown
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            decode("not json"),
            Err(SignalingError::Decode(_))
        ));
    }

    #[test]
    fn parse_call_message_without_sender_in_data() {
        let json = r#"{"type":"message","message":{"sender":{"type":"session","sessionid":"peer-1"},"data":{"to":"me","type":"answer","roomType":"video","payload":{"sdp":"v=0"}}}}"#;
        let ServerMessage::Message { message } = decode(json).unwrap() else {
            panic!("Expected Message");
        };
        let data = message.data.unwrap();
        assert!(!data.has_sender());
        assert_eq!(data.kind, "answer");
        assert_eq!(message.sender.unwrap().sessionid.as_deref(), Some("peer-1"));
    }

    #[test]
    fn narrow_room_join_event() {
        let json = r#"{"target":"room","type":"join","join":[{"sessionid":"s1","userid":"bob","user":{"displayname":"Bob"}},{"sessionid":"s2"}]}"#;
        let event: RoomEvent = serde_json::from_str(json).unwrap();
        let RoomEvent::Join { join } = event else {
            panic!("Expected Join");
        };
        assert_eq!(join.len(), 2);
        assert_eq!(join[0].user.as_ref().unwrap().displayname.as_deref(), Some("Bob"));
        assert!(join[1].userid.is_none());
    }

    #[test]
    fn join_entry_without_session_still_decodes() {
        let json = r#"{"target":"room","type":"join","join":[{"sessionid":"s1"},{"userid":"x"}]}"#;
        let RoomEvent::Join { join } = serde_json::from_str(json).unwrap() else {
            panic!("Expected Join");
        };
        assert_eq!(join.len(), 2);
        assert_eq!(join[0].sessionid.as_deref(), Some("s1"));
        assert!(join[1].sessionid.is_none());
    }

    #[test]
    fn narrow_room_message_event() {
        let json = r#"{"target":"room","type":"message","message":{"roomid":"T1","data":{"chat":{"refresh":true}}}}"#;
        let RoomEvent::Message { message } = serde_json::from_str(json).unwrap() else {
            panic!("Expected Message");
        };
        assert_eq!(message.roomid, "T1");
        assert!(message.refresh_requested());
    }

    #[test]
    fn room_message_without_chat_does_not_refresh() {
        let json = r#"{"target":"room","type":"message","message":{"roomid":"T1","data":{}}}"#;
        let RoomEvent::Message { message } = serde_json::from_str(json).unwrap() else {
            panic!("Expected Message");
        };
        assert!(!message.refresh_requested());
    }

    #[test]
    fn other_room_event_types() {
        let json = r#"{"target":"room","type":"leave","leave":["s1"]}"#;
        assert!(matches!(
            serde_json::from_str::<RoomEvent>(json).unwrap(),
            RoomEvent::Other
        ));
    }
}
