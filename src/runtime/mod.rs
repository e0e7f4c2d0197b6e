/// Runtime execution engine
///
/// Turns a stored workflow into something that runs:
/// - template resolution of node configuration against earlier outputs
/// - the per-kind node behaviors
/// - graph compilation (validation, entry/terminal wiring, cycle rejection)
/// - invoke/stream execution with cancellation
/// - routing of streamed events to live connections
/// - scheduled runs

// `{{$path}}` placeholder resolution
pub mod template;

// Per-run state threaded through handlers
pub mod context;

// Node behavior registry
pub mod executor;

// Workflow -> executable graph
pub mod compiler;

// Petgraph-based DAG execution
pub mod engine;

// Streamed event wire format
pub mod events;

// Live delivery channels keyed by user
pub mod connections;

// Compile + seed + run for the outer surfaces
pub mod runner;

// Background scheduler for schedule-trigger nodes
pub mod scheduler;

pub use compiler::{CompiledGraph, GraphCompiler};
pub use connections::ConnectionRegistry;
pub use context::{OutputKeying, RunContext};
pub use engine::{ExecutionEngine, TraversalStrategy};
pub use events::RunEvent;
pub use executor::NodeExecutor;
pub use runner::WorkflowRunner;
pub use scheduler::ScheduleService;
