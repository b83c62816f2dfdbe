use super::types::SignalingError;

/// Protocol version announced in hello frames
pub const PROTOCOL_VERSION: &str = "1.0";

/// Connection settings for a [`SignalingClient`](super::SignalingClient).
///
/// The endpoint URL is fixed for the lifetime of the client; every
/// reconnect dials the same address.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// WebSocket endpoint of the signaling backend (`ws://` or `wss://`).
    pub url: String,
    /// Backend URL the signaling server calls to validate the ticket.
    pub backend_url: String,
    /// Authenticated user, `None` for guests.
    pub user_id: Option<String>,
    /// Signaling ticket presented in a full hello.
    pub ticket: String,
    /// Local account id, attached to chat refresh events.
    pub internal_user_id: u64,
    pub protocol_version: String,
}

impl SignalingConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backend_url: String::new(),
            user_id: None,
            ticket: String::new(),
            internal_user_id: 0,
            protocol_version: PROTOCOL_VERSION.to_string(),
        }
    }

    #[must_use]
    pub fn with_backend_url(mut self, backend_url: impl Into<String>) -> Self {
        self.backend_url = backend_url.into();
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_ticket(mut self, ticket: impl Into<String>) -> Self {
        self.ticket = ticket.into();
        self
    }

    #[must_use]
    pub fn with_internal_user_id(mut self, internal_user_id: u64) -> Self {
        self.internal_user_id = internal_user_id;
        self
    }

    #[must_use]
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    pub fn validate(&self) -> Result<(), SignalingError> {
        if self.url.is_empty() {
            return Err(SignalingError::InvalidConfig(
                "signaling url is empty".to_string(),
            ));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(SignalingError::InvalidConfig(format!(
                "signaling url must use ws:// or wss://: {}",
                self.url
            )));
        }
        if self.protocol_version.is_empty() {
            return Err(SignalingError::InvalidConfig(
                "protocol version is empty".to_string(),
            ));
        }
        Ok(())
    }
}
