use axum::{
    routing::{any, get},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers::{clab_info_handler, health_handler, topology_handler, AppState};
use super::ws::ws_handler;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // API routes
        .route("/api/health", get(health_handler))
        .route("/topology", get(topology_handler))
        .route("/clab-info", get(clab_info_handler))
        // Event stream and client commands
        .route("/ws", any(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
