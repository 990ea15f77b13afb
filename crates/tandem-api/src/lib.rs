//! REST surface over the connection and conversation services.

pub mod connections;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod requests;
pub mod state;
pub mod swipes;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Every authenticated route. The caller adds CORS, tracing and the gateway.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/swipes", post(swipes::swipe))
        .route("/requests/incoming", get(requests::incoming))
        .route("/requests/outgoing", get(requests::outgoing))
        .route("/requests/{request_id}", delete(requests::cancel))
        .route("/requests/{request_id}/accept", post(requests::accept))
        .route("/requests/{request_id}/reject", post(requests::reject))
        .route("/connections", get(connections::list))
        .route("/connections/{connection_id}", delete(connections::remove))
        .route("/conversations", get(conversations::list).post(conversations::open))
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/conversations/{conversation_id}/read", post(messages::mark_read))
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/unread", get(messages::unread))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state)
}
