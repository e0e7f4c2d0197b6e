/// nodeflow: workflow execution engine
///
/// Compiles node/edge workflow snapshots into petgraph DAGs and runs them, resolving
/// `{{$path}}` references between nodes and streaming progress to live callers.

// Core configuration and setup
pub mod config;

// Engine error types
pub mod error;

// Workflow management layer - definitions, storage, and registry
pub mod workflow;

// Runtime execution engine - compilation, node dispatch, DAG traversal
pub mod runtime;

// External collaborators (credentials, HTTP, LLM, mail)
pub mod services;

// HTTP API layer - workflow CRUD, execution, streaming, webhooks
pub mod api;

// Server setup and initialization
pub mod server;

pub use error::{CompilationError, EngineError, NodeExecutionError, UpstreamServiceError};
pub use runtime::{OutputKeying, RunContext, RunEvent, TraversalStrategy, WorkflowRunner};
pub use server::start_server;
pub use workflow::{Edge, Node, NodeKind, Workflow};
