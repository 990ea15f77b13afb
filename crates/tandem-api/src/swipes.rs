use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use tandem_types::api::{Claims, PassResponse, SwipeDirection, SwipeRequest};
use tandem_types::models::SwipeOutcome;

use crate::error::ApiError;
use crate::state::AppState;

/// Right swipes answer with the outcome (201 when something was created),
/// left swipes with whether an incoming request was declined.
pub async fn swipe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SwipeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let matching = &state.core.matching;

    match req.direction {
        SwipeDirection::Right => {
            // The profile service is authoritative; the client's label only
            // fills in for targets without a recorded role.
            let target_role = state
                .core
                .profile_role(&req.target_id)
                .await
                .unwrap_or(req.target_role);
            let outcome = matching
                .evaluate_swipe_right(&claims.sub, &req.target_id, claims.role, target_role, req.note)
                .await?;
            let status = match outcome {
                SwipeOutcome::Rejected(_) => StatusCode::OK,
                _ => StatusCode::CREATED,
            };
            Ok((status, Json(outcome)).into_response())
        }
        SwipeDirection::Left => {
            let declined = matching.evaluate_swipe_left(&claims.sub, &req.target_id).await?;
            Ok(Json(PassResponse {
                declined: declined.is_some(),
            })
            .into_response())
        }
    }
}
