use axum::{Extension, Json, extract::State, response::IntoResponse};

use tandem_types::api::{Claims, OpenConversationRequest, OpenConversationResponse};

use crate::error::ApiError;
use crate::state::AppState;

/// Get-or-create the caller's conversation with `peer_id`.
pub async fn open(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation_id = state.core.directory.get_or_create(&claims.sub, &req.peer_id).await?;
    Ok(Json(OpenConversationResponse { conversation_id }))
}

/// The caller's conversations, newest activity first, each with the
/// peer's profile summary and the caller's unread count.
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.core.directory.list_views(&claims.sub).await?))
}
