/// Engine error types
///
/// Compilation errors are always raised before any node runs. Upstream errors are
/// produced by collaborator calls inside node handlers and are wrapped into a
/// `NodeExecutionError` at the node boundary so callers can point at the failing node.

use thiserror::Error;

/// Marker substring carried by every trigger node type tag
pub const TRIGGER_MARKER: &str = "trigger";

/// Structural problems found while turning a workflow into an executable graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilationError {
    #[error("No function defined for node type '{node_type}' (node '{node_id}')")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("Duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("Edge '{edge_id}' references unknown node '{node_id}'")]
    UnknownEdgeEndpoint { edge_id: String, node_id: String },

    #[error("Workflow has no trigger node")]
    NoTriggerNode,

    #[error("No start node found: every node has an incoming edge")]
    NoEntryNode,

    #[error("Workflow contains a cycle through node '{node_id}'")]
    CyclicGraph { node_id: String },

    #[error("Node '{node_id}' depends on '{predecessor_id}', which the trigger never reaches")]
    UnreachablePredecessor { node_id: String, predecessor_id: String },
}

impl CompilationError {
    /// Node the error can be pinned to, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            CompilationError::UnknownNodeType { node_id, .. }
            | CompilationError::UnknownEdgeEndpoint { node_id, .. }
            | CompilationError::CyclicGraph { node_id }
            | CompilationError::UnreachablePredecessor { node_id, .. } => Some(node_id),
            CompilationError::DuplicateNodeId(node_id) => Some(node_id),
            CompilationError::NoTriggerNode | CompilationError::NoEntryNode => None,
        }
    }
}

/// Failures raised by collaborators (credential lookup, HTTP, LLM) or by bad node configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamServiceError {
    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    #[error("Credential '{credential_id}' has no value for '{field}'")]
    CredentialFieldMissing { credential_id: String, field: &'static str },

    #[error("Unsupported auth type: {0}")]
    UnsupportedAuthType(String),

    #[error("Invalid node configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("API Error: {0}")]
    ApiErrors(String),

    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Run aborted: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for UpstreamServiceError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamServiceError::Transport(err.to_string())
    }
}

impl From<sqlx::Error> for UpstreamServiceError {
    fn from(err: sqlx::Error) -> Self {
        UpstreamServiceError::Storage(err.to_string())
    }
}

/// A node handler failed; the run stops here
///
/// `node_id` and `node_name` are `None` when the failure cannot be attributed
/// to a single node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Node '{}' failed: {}", .node_id.as_deref().unwrap_or("<unknown>"), .cause)]
pub struct NodeExecutionError {
    pub node_id: Option<String>,
    pub node_name: Option<String>,
    #[source]
    pub cause: UpstreamServiceError,
}

impl NodeExecutionError {
    pub fn at(node_id: impl Into<String>, node_name: impl Into<String>, cause: UpstreamServiceError) -> Self {
        Self {
            node_id: Some(node_id.into()),
            node_name: Some(node_name.into()),
            cause,
        }
    }

    pub fn unattributed(cause: UpstreamServiceError) -> Self {
        Self {
            node_id: None,
            node_name: None,
            cause,
        }
    }
}

/// Anything that can stop a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    Execution(#[from] NodeExecutionError),

    #[error("Run cancelled")]
    Cancelled,
}

impl EngineError {
    /// `(node_name, node_id)` of the node the failure belongs to, when known
    pub fn failed_node(&self) -> (Option<String>, Option<String>) {
        match self {
            EngineError::Execution(e) => (e.node_name.clone(), e.node_id.clone()),
            EngineError::Compilation(e) => {
                let id = e.node_id().map(str::to_string);
                (id.clone(), id)
            }
            EngineError::Cancelled => (None, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_node_type_names_the_type() {
        let err = CompilationError::UnknownNodeType {
            node_id: "n2".into(),
            node_type: "notion-other-tool".into(),
        };
        assert!(err.to_string().contains("notion-other-tool"));
        assert_eq!(err.node_id(), Some("n2"));
    }

    #[test]
    fn failed_node_reports_nulls_for_cancellation() {
        assert_eq!(EngineError::Cancelled.failed_node(), (None, None));
    }

    #[test]
    fn execution_error_keeps_identity() {
        let err: EngineError = NodeExecutionError::at(
            "http-1",
            "Call API",
            UpstreamServiceError::HttpStatus { status: 500, body: "boom".into() },
        )
        .into();
        assert_eq!(
            err.failed_node(),
            (Some("Call API".to_string()), Some("http-1".to_string()))
        );
        assert!(err.to_string().contains("http-1"));
    }
}
