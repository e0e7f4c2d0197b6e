/// nodeflow server entry point
///
/// Serves:
/// - Workflow management API at /api/workflows/*
/// - Synchronous execution at /api/executor/{id}
/// - Streaming execution at /ws/{id}
/// - Webhook triggers at /webhooks/{id}/events
/// - Health check at /healthz

use nodeflow::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // NODEFLOW_* variables override the defaults
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
