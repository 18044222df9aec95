use axum::{
    Json,
    extract::{Path, Query, State},
};

use super::super::AppState;
use super::super::error::ApiResult;
use crate::core::error::SwitchboardError;
use crate::core::store::{NewTask, TaskFilter, TaskUpdate};

pub async fn list_tasks_endpoint(
    State(state): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> ApiResult {
    let tasks = state.fleet.tasks.list(&filter).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "tasks": tasks
    })))
}

pub async fn create_task_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<NewTask>,
) -> ApiResult {
    if payload.name.trim().is_empty() || payload.command.trim().is_empty() {
        return Err(
            SwitchboardError::InvalidState("name and command are required".to_string()).into(),
        );
    }
    let task = state.fleet.tasks.create(&payload).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "task": task
    })))
}

pub async fn get_task_endpoint(
    Path(task_id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult {
    let task = state.fleet.tasks.get(task_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "task": task
    })))
}

pub async fn update_task_endpoint(
    Path(task_id): Path<i64>,
    State(state): State<AppState>,
    Json(payload): Json<TaskUpdate>,
) -> ApiResult {
    let task = state.fleet.tasks.update(task_id, &payload).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "task": task
    })))
}

pub async fn delete_task_endpoint(
    Path(task_id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult {
    state.fleet.tasks.delete(task_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Task {} deleted", task_id)
    })))
}

pub async fn run_task_endpoint(
    Path(task_id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult {
    let task = state.fleet.tasks.run(task_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Task {} queued", task_id),
        "task": task
    })))
}
