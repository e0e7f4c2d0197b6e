/// Server setup and initialization
///
/// Wires together storage, registry, collaborators, runtime, scheduler and routes.

use crate::{
    api::{
        create_executor_routes, create_webhook_routes, create_websocket_routes,
        create_workflow_routes, AppState,
    },
    config::Config,
    runtime::{
        connections::ConnectionRegistry, executor::NodeExecutor, runner::WorkflowRunner,
        scheduler::ScheduleService,
    },
    services::{
        credentials::SqliteCredentialStore, http::ReqwestSender, llm::ChatCompletionsClient,
        Collaborators,
    },
    workflow::{registry::WorkflowRegistry, storage::WorkflowStorage},
};
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::{path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;

/// Open (and create if needed) the SQLite database
pub async fn connect_database(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid database url '{}'", url))?
        .create_if_missing(true);

    if let Some(dir) = Path::new(options.get_filename()).parent() {
        if !dir.as_os_str().is_empty() {
            tracing::info!("📁 Ensuring data directory exists: {}", dir.display());
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create data directory {}", dir.display()))?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database '{}'", url))?;
    Ok(pool)
}

/// Create the main Axum application with all routes
pub async fn create_app(config: Config) -> Result<Router> {
    let pool = connect_database(&config.database.url).await?;

    tracing::info!("📋 Initializing workflow storage");
    let workflow_storage = WorkflowStorage::new(pool.clone());
    workflow_storage.init_schema().await?;

    let credential_store = Arc::new(SqliteCredentialStore::new(pool));
    credential_store.init_schema().await?;

    tracing::info!("📥 Loading existing workflows from storage");
    let workflow_registry = Arc::new(WorkflowRegistry::new(workflow_storage));
    workflow_registry
        .init_from_storage()
        .await
        .context("failed to load workflows from storage")?;

    tracing::info!("⚙️ Initializing node executor ({:?} keying)", config.engine.output_keying);
    let timeout = config.providers.http_timeout();
    let collaborators = Collaborators {
        credentials: credential_store.clone(),
        http: Arc::new(ReqwestSender::new(timeout)?),
        llm: Arc::new(ChatCompletionsClient::new(
            config.providers.openai_base_url.clone(),
            config.providers.gemini_base_url.clone(),
            timeout,
        )?),
    };
    let node_executor = Arc::new(
        NodeExecutor::new(collaborators, config.engine.output_keying)
            .with_mail_endpoint(config.providers.mail_endpoint.clone()),
    );
    let runner = Arc::new(WorkflowRunner::new(node_executor, config.engine.traversal));

    tracing::info!("⏰ Initializing schedule service");
    let scheduler = Arc::new(
        ScheduleService::new(Arc::clone(&workflow_registry), Arc::clone(&runner))
            .await
            .context("failed to initialize scheduler")?,
    );
    let scheduler_clone = Arc::clone(&scheduler);
    tokio::spawn(async move {
        if let Err(e) = scheduler_clone.start().await {
            tracing::error!("❌ Failed to start schedule service: {}", e);
        }
    });

    let app_state = AppState {
        registry: workflow_registry,
        runner,
        scheduler,
        connections: ConnectionRegistry::new(),
        credentials: credential_store,
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_executor_routes())
        .merge(create_websocket_routes())
        .merge(create_webhook_routes())
        .with_state(app_state);

    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting nodeflow server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
