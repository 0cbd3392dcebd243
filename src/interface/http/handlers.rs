use std::sync::Arc;

use axum::{
    debug_handler,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tokio::sync::broadcast;

use crate::adapters::clab::{ClabRegistry, TopologyGraph};
use crate::application::{OutboundEvent, TimeMachine};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub timemachine: Arc<TimeMachine>,
    pub registry: Arc<ClabRegistry>,
    pub topology: Arc<TopologyGraph>,
    pub events: broadcast::Sender<OutboundEvent>,
}

/// Handler for GET /api/health
pub async fn health_handler() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "service": "gnmon"
        })),
    )
}

/// Handler for GET /topology
#[debug_handler]
pub async fn topology_handler(State(state): State<AppState>) -> Json<TopologyGraph> {
    Json(state.topology.as_ref().clone())
}

/// Handler for GET /clab-info (raw containerlab inspect output)
#[debug_handler]
pub async fn clab_info_handler(State(state): State<AppState>) -> Response {
    match state.registry.inspect().await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
