/// HTTP API Layer
///
/// Thin axum routes over the runtime:
/// - Workflow snapshot CRUD
/// - Synchronous execution
/// - Streaming execution over a websocket
/// - Webhook triggers

use std::sync::Arc;

use crate::{
    runtime::{connections::ConnectionRegistry, runner::WorkflowRunner, scheduler::ScheduleService},
    services::credentials::CredentialStore,
    workflow::registry::WorkflowRegistry,
};

// Workflow management endpoints (GET/PUT/DELETE)
pub mod workflows;

// POST /api/executor/{id}
pub mod executor;

// GET /ws/{id}
pub mod websocket;

// POST /webhooks/{id}/events
pub mod webhooks;

pub use executor::create_executor_routes;
pub use webhooks::create_webhook_routes;
pub use websocket::create_websocket_routes;
pub use workflows::create_workflow_routes;

/// Application state shared by every route
#[derive(Clone)]
pub struct AppState {
    /// Hot-reload registry for in-memory workflows
    pub registry: Arc<WorkflowRegistry>,
    pub runner: Arc<WorkflowRunner>,
    /// Schedule jobs are refreshed on every save/delete
    pub scheduler: Arc<ScheduleService>,
    pub connections: ConnectionRegistry,
    /// Used to verify webhook callers
    pub credentials: Arc<dyn CredentialStore>,
}
