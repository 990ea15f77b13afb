use serde::{Deserialize, Serialize};

use crate::models::{MessageKind, Role};

// -- JWT Claims --

/// Identity claims issued by the external auth service and shared by
/// tandem-api (REST middleware) and tandem-gateway (WebSocket upgrade).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

// -- Swipes --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Right,
    Left,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwipeRequest {
    pub target_id: String,
    pub target_role: Role,
    pub direction: SwipeDirection,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PassResponse {
    /// True when the pass declined an incoming pending request.
    pub declined: bool,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenConversationRequest {
    pub peer_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenConversationResponse {
    pub conversation_id: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    /// Messages that flipped to read.
    pub marked: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadResponse {
    pub total: u64,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
