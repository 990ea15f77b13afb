use serde::{Deserialize, Serialize};

use crate::models::{Connection, ConnectionRequest, ConversationView, Message, Role};

/// Store-level change notifications fanned out to in-process subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChangeEvent {
    /// A request between the ordered pair was created or changed status
    RequestChanged { from_id: String, to_id: String },

    /// A connection between the pair was created or removed
    ConnectionChanged { a: String, b: String },

    /// Conversation metadata changed (created, last message, unread counters)
    ConversationChanged {
        conversation_id: String,
        participants: [String; 2],
    },

    /// The message list of a conversation changed
    MessagesChanged { conversation_id: String },
}

impl ChangeEvent {
    /// Whether `user_id` is one of the parties this event is about.
    pub fn concerns_user(&self, user_id: &str) -> bool {
        match self {
            Self::RequestChanged { from_id, to_id } => from_id == user_id || to_id == user_id,
            Self::ConnectionChanged { a, b } => a == user_id || b == user_id,
            Self::ConversationChanged { participants, .. } => {
                participants.iter().any(|p| p == user_id)
            }
            Self::MessagesChanged { .. } => false,
        }
    }

    /// Returns the conversation this event is scoped to, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::ConversationChanged {
                conversation_id, ..
            } => Some(conversation_id.as_str()),
            Self::MessagesChanged { conversation_id } => Some(conversation_id.as_str()),
            _ => None,
        }
    }
}

/// Events sent over the WebSocket gateway. Every payload is a full snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: String, role: Role },

    /// Incoming pending requests for this user, newest first
    PendingRequests { requests: Vec<ConnectionRequest> },

    /// Connections of this user, newest first
    Connections { connections: Vec<Connection> },

    /// Conversations of this user, most recently updated first
    Conversations {
        conversations: Vec<ConversationView>,
        unread_total: u64,
    },

    /// Ordered messages of a watched conversation
    Messages {
        conversation_id: String,
        messages: Vec<Message>,
    },

    /// A command could not be honoured
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start receiving message snapshots for a conversation
    Watch { conversation_id: String },

    /// Stop receiving message snapshots for a conversation
    Unwatch { conversation_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_event_concerns_both_ends() {
        let event = ChangeEvent::RequestChanged {
            from_id: "alice".into(),
            to_id: "bob".into(),
        };
        assert!(event.concerns_user("alice"));
        assert!(event.concerns_user("bob"));
        assert!(!event.concerns_user("carol"));
        assert_eq!(event.conversation_id(), None);
    }

    #[test]
    fn message_event_is_conversation_scoped() {
        let event = ChangeEvent::MessagesChanged {
            conversation_id: "c1".into(),
        };
        assert_eq!(event.conversation_id(), Some("c1"));
        assert!(!event.concerns_user("alice"));
    }

    #[test]
    fn command_wire_format() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"Watch","data":{"conversation_id":"c1"}}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::Watch { conversation_id } if conversation_id == "c1"));
    }
}
