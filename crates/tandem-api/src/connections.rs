use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use tandem_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.core.registry.list_for(&claims.sub).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state.core.registry.remove(connection_id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}
