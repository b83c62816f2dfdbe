use std::collections::HashMap;

use tracing::warn;

use super::messages::JoinEntry;
use super::types::{ActorType, Participant};

/// Session id -> participant identity, built from room join events.
///
/// Entries live as long as the client; the backend's leave events are not
/// tracked here.
#[derive(Debug, Default)]
pub struct ParticipantDirectory {
    participants: HashMap<String, Participant>,
}

impl ParticipantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the entry has no session id and was skipped
    pub fn merge_join(&mut self, entry: &JoinEntry) -> bool {
        let Some(session_id) = entry.sessionid.as_deref().filter(|id| !id.is_empty()) else {
            warn!("Skipping join entry without session id");
            return false;
        };
        let (actor_type, actor_id) = match entry.userid.as_deref() {
            Some(user_id) if !user_id.is_empty() => (ActorType::Users, Some(user_id.to_string())),
            _ => (ActorType::Guests, None),
        };
        let display_name = entry.user.as_ref().and_then(|user| user.displayname.clone());

        match self.participants.get_mut(session_id) {
            Some(existing) => {
                existing.actor_type = actor_type;
                existing.actor_id = actor_id;
                if display_name.is_some() {
                    existing.display_name = display_name;
                }
            }
            None => {
                self.participants.insert(
                    session_id.to_string(),
                    Participant {
                        actor_type,
                        actor_id,
                        display_name,
                    },
                );
            }
        }
        true
    }

    pub fn get(&self, session_id: &str) -> Option<&Participant> {
        self.participants.get(session_id)
    }

    /// Display name for a session, empty when unknown
    pub fn display_name(&self, session_id: &str) -> &str {
        self.participants
            .get(session_id)
            .and_then(|p| p.display_name.as_deref())
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
