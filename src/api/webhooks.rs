/// Webhook trigger endpoint
///
/// POST /webhooks/{id}/events accepts a JSON body that becomes the output of the
/// workflow's webhook trigger. The caller is acknowledged straight away; the run
/// continues in the background and reports through the log.
///
/// A webhook trigger may require caller auth with `authType` + `credentialId` in its
/// state. The expected header is derived the same way outbound requests are signed.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::{
    services::credentials::{auth_header, require_credential},
    workflow::types::{Node, NodeKind},
};

/// Auth settings stored in a webhook trigger's `data.state`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookAuth {
    #[serde(default)]
    auth_type: String,
    #[serde(default)]
    credential_id: String,
}

impl WebhookAuth {
    fn from_node(node: &Node) -> Self {
        serde_json::from_value(node.data.state.clone()).unwrap_or_default()
    }
}

pub fn create_webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/{id}/events", post(receive_webhook))
}

/// Does the request carry the expected header verbatim
fn authorized(headers: &HeaderMap, expected: &(String, String)) -> bool {
    let (name, value) = expected;
    headers
        .get(name.as_str())
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == value)
}

async fn receive_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    tracing::info!("📥 Webhook request received: {}", id);

    let reject = |status: StatusCode, message: &str| (status, Json(json!({ "message": message })));

    let workflow = state.registry.get_workflow(&id).ok_or_else(|| {
        tracing::warn!("❌ Webhook called for unknown workflow: {}", id);
        reject(StatusCode::NOT_FOUND, "Webhook not found")
    })?;

    let trigger = workflow
        .trigger_node()
        .filter(|node| node.kind() == Some(NodeKind::WebhookTrigger))
        .ok_or_else(|| {
            tracing::warn!("❌ Workflow {} does not start with a webhook trigger", id);
            reject(StatusCode::NOT_FOUND, "Webhook not found")
        })?;

    let auth = WebhookAuth::from_node(trigger);
    if !auth.auth_type.is_empty() && auth.auth_type != "none" {
        let expected = match require_credential(state.credentials.as_ref(), &auth.credential_id).await {
            Ok(credential) => auth_header(&credential, &auth.auth_type),
            Err(e) => Err(e),
        };
        match expected {
            Ok(Some(expected)) if !authorized(&headers, &expected) => {
                tracing::warn!("❌ Unauthorized webhook call for workflow {}", id);
                return Err(reject(StatusCode::FORBIDDEN, "Unauthorized"));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("❌ Webhook auth for workflow {} is misconfigured: {}", id, e);
                return Err(reject(StatusCode::FORBIDDEN, "Unauthorized"));
            }
        }
    }

    let runner = state.runner.clone();
    let workflow_id = id.clone();
    tokio::spawn(async move {
        match runner
            .invoke(&workflow, Some(payload), &CancellationToken::new())
            .await
        {
            Ok(_) => tracing::info!("🎉 Webhook run completed: {}", workflow_id),
            Err(e) => {
                let (name, node_id) = e.failed_node();
                tracing::error!(
                    failed_node_id = ?node_id,
                    failed_node_name = ?name,
                    "❌ Webhook run failed: {} - Error: {}",
                    workflow_id,
                    e
                );
            }
        }
    });

    Ok(Json(json!({ "message": "Webhook received" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_must_match_exactly() {
        let expected = ("x-api-key".to_string(), "k-1".to_string());
        let mut headers = HeaderMap::new();
        assert!(!authorized(&headers, &expected));

        headers.insert("x-api-key", HeaderValue::from_static("k-2"));
        assert!(!authorized(&headers, &expected));

        headers.insert("x-api-key", HeaderValue::from_static("k-1"));
        assert!(authorized(&headers, &expected));
    }

    #[test]
    fn auth_settings_from_trigger_state() {
        let node = Node::new("w", "webhook-trigger")
            .with_state(json!({"authType": "bearer", "credentialId": "c1"}));
        let auth = WebhookAuth::from_node(&node);
        assert_eq!(auth.auth_type, "bearer");
        assert_eq!(auth.credential_id, "c1");

        let open = WebhookAuth::from_node(&Node::new("w", "webhook-trigger"));
        assert!(open.auth_type.is_empty());
    }
}
