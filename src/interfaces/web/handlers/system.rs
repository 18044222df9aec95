use axum::{Json, extract::State};

use super::super::AppState;
use super::super::error::ApiResult;

pub async fn health_endpoint(State(state): State<AppState>) -> ApiResult {
    let connected = state.fleet.connected_servers().await?.len();
    Ok(Json(serde_json::json!({
        "success": true,
        "version": env!("CARGO_PKG_VERSION"),
        "connected_servers": connected,
        "live_clients": state.clients.count().await
    })))
}
