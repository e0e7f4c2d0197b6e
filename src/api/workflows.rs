/// Workflow management REST API endpoints
///
/// Snapshots are written through the registry (storage first, then the in-memory swap)
/// and the scheduler is resynced so schedule triggers follow the latest version.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use super::AppState;
use crate::workflow::types::Workflow;

#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
    /// Schedule jobs registered for this snapshot
    pub schedules: usize,
}

pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", get(list_workflows))
        .route(
            "/api/workflows/{id}",
            get(get_workflow).put(save_workflow).delete(delete_workflow),
        )
}

/// GET /api/workflows
async fn list_workflows(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.registry.list_summaries().await {
        Ok(workflows) => Ok(Json(json!({ "workflows": workflows }))),
        Err(e) => {
            tracing::error!("Failed to list workflows: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, StatusCode> {
    state
        .registry
        .get_workflow(&id)
        .map(|workflow| Json((*workflow).clone()))
        .ok_or(StatusCode::NOT_FOUND)
}

/// PUT /api/workflows/{id}
///
/// Body: the workflow snapshot `{ "name", "nodes": [...], "edges": [...] }`; the id
/// in the path wins over any id in the body.
async fn save_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut workflow): Json<Workflow>,
) -> Result<Json<WorkflowResponse>, StatusCode> {
    workflow.id = id;

    let workflow = state.registry.save_workflow(workflow).await.map_err(|e| {
        tracing::error!("Failed to save workflow: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    // Compile errors are not fatal for storage: the canvas saves drafts
    if let Err(e) = state.runner.compile(&workflow) {
        tracing::warn!(workflow_id = %workflow.id, "⚠️ Saved workflow does not compile yet: {}", e);
    }

    let schedules = state.scheduler.sync_workflow(&workflow).await;
    tracing::info!("🔥 Saved workflow: {} ({}) with {} schedules", workflow.id, workflow.name, schedules);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' saved", workflow.name),
        schedules,
    }))
}

/// DELETE /api/workflows/{id}
async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state.scheduler.remove_workflow(&id).await;

    match state.registry.remove_workflow(&id).await {
        Ok(true) => {
            tracing::info!("Deleted workflow: {}", id);
            Ok(Json(json!({ "message": "Workflow deleted successfully" })))
        }
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to delete workflow: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
