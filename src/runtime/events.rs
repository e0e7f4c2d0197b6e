/// Events emitted by a streaming run
///
/// Wire shape: `{"message": "progress", "chunk": {...}}` per finished node, then exactly
/// one terminal `completed` or `failed` event.

use serde::{Deserialize, Serialize};

use super::context::RunContext;
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressChunk {
    pub node_id: String,
    pub partial_context: RunContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum RunEvent {
    Progress { chunk: ProgressChunk },
    Completed,
    Failed {
        error: String,
        failed_node_name: Option<String>,
        failed_node_id: Option<String>,
    },
}

impl RunEvent {
    pub fn progress(node_id: impl Into<String>, partial_context: RunContext) -> Self {
        RunEvent::Progress {
            chunk: ProgressChunk {
                node_id: node_id.into(),
                partial_context,
            },
        }
    }

    pub fn from_error(error: &EngineError) -> Self {
        let (failed_node_name, failed_node_id) = error.failed_node();
        RunEvent::Failed {
            error: error.to_string(),
            failed_node_name,
            failed_node_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunEvent::Progress { .. })
    }
}
