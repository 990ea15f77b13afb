use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content shown in place of a soft-deleted message.
pub const TOMBSTONE: &str = "This message was deleted";

// -- Roles --

/// The three kinds of actor on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Venture,
    Individual,
    #[serde(alias = "capital_provider")]
    Capital,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Venture, Role::Individual, Role::Capital];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Venture => "venture",
            Self::Individual => "individual",
            Self::Capital => "capital",
        }
    }

    /// Dense index used by role-pair lookup tables.
    pub fn index(&self) -> usize {
        match self {
            Self::Venture => 0,
            Self::Individual => 1,
            Self::Capital => 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "venture" => Ok(Self::Venture),
            "individual" => Ok(Self::Individual),
            "capital" | "capital_provider" => Ok(Self::Capital),
            other => Err(ParseEnumError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

// -- Connection requests --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseEnumError {
                kind: "request status",
                value: other.to_string(),
            }),
        }
    }
}

/// A one-directional signal of interest. Never hard-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub id: Uuid,
    pub from_id: String,
    pub to_id: String,
    pub from_role: Role,
    pub status: RequestStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Connections --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Accepted,
}

/// A confirmed, symmetric relationship between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub participant_a: String,
    pub participant_b: String,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub last_interaction_at: DateTime<Utc>,
}

impl Connection {
    pub fn participants(&self) -> [&str; 2] {
        [self.participant_a.as_str(), self.participant_b.as_str()]
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    /// The participant that is not `user_id`, if `user_id` is one of them.
    pub fn other(&self, user_id: &str) -> Option<&str> {
        if self.participant_a == user_id {
            Some(self.participant_b.as_str())
        } else if self.participant_b == user_id {
            Some(self.participant_a.as_str())
        } else {
            None
        }
    }
}

// -- Conversations --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub sender_id: String,
    pub created_at: DateTime<Utc>,
}

/// One conversation per unordered pair of users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: [String; 2],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message: Option<LastMessage>,
    pub unread_count: BTreeMap<String, u32>,
}

impl Conversation {
    pub fn involves(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        match &self.participants {
            [a, b] if a == user_id => Some(b.as_str()),
            [a, b] if b == user_id => Some(a.as_str()),
            _ => None,
        }
    }

    pub fn unread_for(&self, user_id: &str) -> u32 {
        self.unread_count.get(user_id).copied().unwrap_or(0)
    }
}

/// Display fields for a user, supplied by the profile service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub user_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub role: Option<Role>,
}

impl ProfileSummary {
    /// Stand-in used when the profile service has nothing for this user.
    pub fn placeholder(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: "Unknown user".to_string(),
            avatar_url: None,
            role: None,
        }
    }
}

/// A conversation as seen by one of its participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub peer: ProfileSummary,
    pub unread: u32,
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::System => "system",
        }
    }
}

impl FromStr for MessageKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "system" => Ok(Self::System),
            other => Err(ParseEnumError {
                kind: "message kind",
                value: other.to_string(),
            }),
        }
    }
}

/// `read` and `deleted` are independent flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub deleted: bool,
}

// -- Matching --

/// Why a swipe-right produced no new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    SelfSwipe,
    AlreadyConnected,
    AlreadyRequested,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SelfSwipe => "cannot connect to yourself",
            Self::AlreadyConnected => "already connected",
            Self::AlreadyRequested => "request already pending",
        })
    }
}

/// Result of a swipe-right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum SwipeOutcome {
    /// Connection created immediately, no request involved.
    ConnectionCreated(Connection),
    /// A pending request now waits on the target.
    RequestCreated(ConnectionRequest),
    /// The target had already shown interest; the pair is now connected.
    RequestAccepted(Connection),
    Rejected(RejectReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_accepts_capital_provider_alias() {
        let role: Role = serde_json::from_str("\"capital_provider\"").unwrap();
        assert_eq!(role, Role::Capital);
        assert_eq!("capital_provider".parse::<Role>().unwrap(), Role::Capital);
        assert_eq!(serde_json::to_string(&Role::Capital).unwrap(), "\"capital\"");
    }

    #[test]
    fn role_indexes_are_dense() {
        let mut seen: Vec<usize> = Role::ALL.iter().map(Role::index).collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn conversation_other_participant() {
        let now = Utc::now();
        let convo = Conversation {
            id: "c".into(),
            participants: ["alice".into(), "bob".into()],
            created_at: now,
            updated_at: now,
            last_message: None,
            unread_count: BTreeMap::from([("bob".to_string(), 2)]),
        };
        assert_eq!(convo.other_participant("alice"), Some("bob"));
        assert_eq!(convo.other_participant("bob"), Some("alice"));
        assert_eq!(convo.other_participant("carol"), None);
        assert_eq!(convo.unread_for("bob"), 2);
        assert_eq!(convo.unread_for("alice"), 0);
    }

    #[test]
    fn swipe_outcome_is_tagged() {
        let json = serde_json::to_value(SwipeOutcome::Rejected(RejectReason::AlreadyConnected)).unwrap();
        assert_eq!(json["outcome"], "rejected");
        assert_eq!(json["data"], "already_connected");
    }
}
