use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use tandem_core::CoreError;
use tandem_types::api::ErrorBody;

/// A core failure on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_soft() => StatusCode::CONFLICT,
            e if e.is_stale() => StatusCode::NOT_FOUND,
            CoreError::NotPermitted(_) | CoreError::NotParticipant { .. } | CoreError::NotConnected => {
                StatusCode::FORBIDDEN
            }
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match &self.0 {
            CoreError::ConversationNotFound(_) => "this conversation is no longer available".into(),
            CoreError::NotFound { entity, .. } => format!("{} not found", entity),
            CoreError::Persistence(_) => "internal error, try again".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {:#}", self.0);
        }
        (status, Json(ErrorBody { error: self.message() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError(CoreError::DuplicateRequest).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError(CoreError::AlreadyProcessed).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError(CoreError::ConversationNotFound("c".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError(CoreError::NotConnected).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError(CoreError::InvalidInput("empty".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(CoreError::Persistence(anyhow::anyhow!("disk full"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn stale_conversation_has_friendly_message() {
        let err = ApiError(CoreError::ConversationNotFound("c".into()));
        assert_eq!(err.message(), "this conversation is no longer available");
    }
}
