/// Streaming execution over a websocket
///
/// GET /ws/{id}?user_id=... upgrades, registers the socket in the connection registry
/// and streams one text frame per run event. A user has at most one live run: opening
/// a second socket cancels the first. Closing the socket cancels the run.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::AppState;
use crate::{error::EngineError, runtime::events::RunEvent, workflow::types::Workflow};

const SOCKET_BUFFER: usize = 32;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Anonymous callers get a fresh id per socket
    pub user_id: Option<String>,
}

pub fn create_websocket_routes() -> Router<AppState> {
    Router::new().route("/ws/{id}", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let Some(workflow) = state.registry.get_workflow(&id) else {
        tracing::warn!("❌ Stream requested for unknown workflow: {}", id);
        return StatusCode::NOT_FOUND.into_response();
    };

    let user_id = query.user_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, state, workflow, user_id))
        .into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState, workflow: Arc<Workflow>, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel(SOCKET_BUFFER);
    let registration = state.connections.register(&user_id, tx).await;
    tracing::info!(%user_id, run_id = %registration.run_id, "🔌 Stream connected for workflow {}", workflow.id);

    // Engine -> registry
    let pump = {
        let connections = state.connections.clone();
        let registration = registration.clone();
        let user_id = user_id.clone();
        let started = state
            .runner
            .stream(&workflow, None, registration.cancel.clone());

        tokio::spawn(async move {
            match started {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        // Delivery is keyed by run id so a replaced run cannot reach the new socket
                        if !connections.deliver(&user_id, registration.run_id, event).await {
                            break;
                        }
                    }
                }
                Err(e) => {
                    let event = RunEvent::from_error(&EngineError::Compilation(e));
                    connections.deliver(&user_id, registration.run_id, event).await;
                }
            }
            connections.remove(&user_id, registration.run_id).await;
        })
    };

    // Registry -> socket
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let terminal = event.is_terminal();
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("❌ Failed to encode run event: {}", e);
                        break;
                    }
                };
                if let Err(e) = sender.send(Message::Text(json.into())).await {
                    tracing::debug!(%user_id, "📭 Socket send failed: {}", e);
                    break;
                }
                if terminal {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(%user_id, "🔌 Client closed stream");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(%user_id, "WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            _ = registration.cancel.cancelled() => {
                tracing::info!(%user_id, "🛑 Stream superseded or cancelled");
                break;
            }
        }
    }

    registration.cancel.cancel();
    drop(rx);
    if let Err(e) = pump.await {
        tracing::debug!("Stream pump ended abnormally: {}", e);
    }
    let _ = sender.close().await;
    tracing::info!(%user_id, run_id = %registration.run_id, "🔌 Stream closed");
}
