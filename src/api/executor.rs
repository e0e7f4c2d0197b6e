/// Synchronous execution endpoint
///
/// POST /api/executor/{id} runs the stored snapshot to completion and answers with the
/// final context, or 422 with the failing node named.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::runtime::events::RunEvent;

pub fn create_executor_routes() -> Router<AppState> {
    Router::new().route("/api/executor/{id}", post(execute_workflow))
}

/// Empty body runs with the trigger's cached output; a JSON body replaces it
pub(crate) fn parse_payload(body: &str) -> Result<Option<Value>, serde_json::Error> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body).map(Some)
}

async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Response {
    let Some(workflow) = state.registry.get_workflow(&id) else {
        tracing::warn!("❌ Execution requested for unknown workflow: {}", id);
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "Workflow not found" }))).into_response();
    };

    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("❌ Invalid JSON payload for workflow {}: {}", id, e);
            return (StatusCode::BAD_REQUEST, Json(json!({ "message": "Invalid JSON payload" }))).into_response();
        }
    };

    match state
        .runner
        .invoke(&workflow, payload, &CancellationToken::new())
        .await
    {
        Ok(ctx) => (StatusCode::OK, Json(ctx)).into_response(),
        Err(e) => {
            tracing::error!("❌ Workflow execution failed: {} - Error: {}", id, e);
            (StatusCode::UNPROCESSABLE_ENTITY, Json(RunEvent::from_error(&e))).into_response()
        }
    }
}
