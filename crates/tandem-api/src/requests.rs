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

pub async fn incoming(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.core.ledger.list_pending_for(&claims.sub).await?))
}

pub async fn outgoing(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.core.ledger.list_sent_by(&claims.sub).await?))
}

pub async fn accept(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let connection = state.core.ledger.accept(request_id, &claims.sub).await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state.core.ledger.reject(request_id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Withdraw one of your own pending requests.
pub async fn cancel(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state.core.ledger.cancel(request_id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}
