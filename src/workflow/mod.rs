/// Workflow management layer
///
/// Workflow definitions as the canvas sends them, SQLite snapshot storage, and the
/// lock-free in-memory registry the runtime reads from.

// Core workflow type definitions
pub mod types;

// SQLite persistence for workflow snapshots
pub mod storage;

// Hot-reload registry using ArcSwap
pub mod registry;

pub use registry::WorkflowRegistry;
pub use storage::{WorkflowStorage, WorkflowSummary};
pub use types::{Edge, Node, NodeData, NodeKind, Workflow};
