//! Error taxonomy for the connection and conversation services.

use thiserror::Error;

/// Errors returned by the core services.
///
/// `DuplicateRequest`, `AlreadyConnected` and `AlreadyProcessed` are the
/// expected outcomes of benign races: callers treat them as a no-op or a
/// re-fetch. `NotFound` and `ConversationNotFound` mean the caller holds a
/// stale id. `Persistence` is the only class worth a generic "try again".
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("a pending request already exists for this pair")]
    DuplicateRequest,

    #[error("users are already connected")]
    AlreadyConnected,

    #[error("request was already processed")]
    AlreadyProcessed,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("not permitted: {0}")]
    NotPermitted(&'static str),

    #[error("{user_id} is not a participant of conversation {conversation_id}")]
    NotParticipant {
        conversation_id: String,
        user_id: String,
    },

    #[error("users must be connected before they can message")]
    NotConnected,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl CoreError {
    /// Race outcomes that should never reach the end user as a failure.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRequest | Self::AlreadyConnected | Self::AlreadyProcessed
        )
    }

    /// The caller referenced something that no longer exists.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ConversationNotFound(_))
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(CoreError::DuplicateRequest.is_soft());
        assert!(CoreError::AlreadyProcessed.is_soft());
        assert!(!CoreError::NotConnected.is_soft());
        assert!(CoreError::ConversationNotFound("c".into()).is_stale());
        assert!(CoreError::not_found("request", "r1").is_stale());
        assert!(!CoreError::Persistence(anyhow::anyhow!("disk")).is_stale());
    }

    #[test]
    fn not_found_message() {
        let err = CoreError::not_found("connection", "abc");
        assert_eq!(err.to_string(), "connection not found: abc");
    }
}
