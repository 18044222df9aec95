use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use super::super::AppState;
use super::super::error::ApiResult;
use crate::core::error::SwitchboardError;
use crate::core::store::{NewServer, ServerUpdate};

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

pub async fn list_servers_endpoint(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> ApiResult {
    let servers = state
        .fleet
        .list_servers(page.offset, Some(page.limit.unwrap_or(100)))
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "servers": servers
    })))
}

pub async fn create_server_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<NewServer>,
) -> ApiResult {
    let server = state.fleet.create_server(&payload).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "server": server
    })))
}

pub async fn get_server_endpoint(
    Path(server_id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult {
    let server = state.fleet.get_server(server_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "server": server
    })))
}

pub async fn update_server_endpoint(
    Path(server_id): Path<i64>,
    State(state): State<AppState>,
    Json(payload): Json<ServerUpdate>,
) -> ApiResult {
    let server = state.fleet.update_server(server_id, payload).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "server": server
    })))
}

pub async fn delete_server_endpoint(
    Path(server_id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult {
    state.fleet.delete_server(server_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Server {} deleted", server_id)
    })))
}

pub async fn connect_server_endpoint(
    Path(server_id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult {
    let outcome = state.fleet.registry.connect(server_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": outcome.message,
        "connection_id": outcome.connection_id
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct DisconnectParams {
    #[serde(default)]
    force: bool,
}

pub async fn disconnect_server_endpoint(
    Path(server_id): Path<i64>,
    State(state): State<AppState>,
    Query(params): Query<DisconnectParams>,
) -> ApiResult {
    let outcome = state
        .fleet
        .registry
        .disconnect(server_id, params.force)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": outcome.message,
        "warning": outcome.warning
    })))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    command: String,
    #[serde(default = "default_true")]
    auto_reconnect: bool,
}

pub async fn execute_command_endpoint(
    Path(server_id): Path<i64>,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteRequest>,
) -> ApiResult {
    let command = payload.command.trim();
    if command.is_empty() {
        return Err(SwitchboardError::InvalidState("command is required".to_string()).into());
    }

    let outcome = state
        .fleet
        .dispatcher
        .execute(server_id, command, payload.auto_reconnect)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": outcome.message,
        "output": outcome.output,
        "reconnected": outcome.reconnected,
        "recovered_error": outcome.recovered_error
    })))
}

pub async fn server_logs_endpoint(
    Path(server_id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult {
    let logs = state.fleet.server_logs(server_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "logs": logs
    })))
}

#[derive(Debug, Deserialize)]
pub struct MetricsParams {
    #[serde(default = "default_true")]
    auto_reconnect: bool,
}

pub async fn server_metrics_endpoint(
    Path(server_id): Path<i64>,
    State(state): State<AppState>,
    Query(params): Query<MetricsParams>,
) -> ApiResult {
    let outcome = state
        .fleet
        .sampler
        .sample(server_id, params.auto_reconnect)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "metrics": outcome.metrics,
        "reconnected": outcome.reconnected,
        "recovered_error": outcome.recovered_error
    })))
}
