mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use tandem_api::middleware::decode_token;
use tandem_api::state::{AppState, AppStateInner};
use tandem_core::{HttpProfileDirectory, ProfileDirectory, StaticProfiles, Tandem};
use tandem_gateway::connection;

use crate::config::ServerConfig;

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let profiles: Arc<dyn ProfileDirectory> = match &config.profile_url {
        Some(url) => {
            info!("Profile service at {}", url);
            Arc::new(HttpProfileDirectory::new(url)?)
        }
        None => {
            warn!("TANDEM_PROFILE_URL not set, conversation peers will show as placeholders");
            Arc::new(StaticProfiles::new())
        }
    };

    // Init database
    let db = tandem_db::Database::open(&config.db_path)?;
    let core = Tandem::new(db, config.core.clone(), profiles);
    let state = AppStateInner::new(core, config.jwt_secret.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = Router::new()
        .merge(tandem_api::router(state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Tandem server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Browsers cannot set headers on a WebSocket upgrade, so the token rides
/// in the query string and is checked before upgrading.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let claims = decode_token(&query.token, &state.jwt_secret).map_err(|_| StatusCode::UNAUTHORIZED)?;
    let core = state.core.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, core, claims)))
}
