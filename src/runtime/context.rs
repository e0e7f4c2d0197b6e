/// Per-run mutable state threaded through node handlers
///
/// `input` accumulates node outputs and is what templates resolve against.
/// `state` is an immutable snapshot of the graph so a handler can find its own
/// configuration by node id. The snapshot sits behind an `Arc`: cloning a
/// context for streaming or concurrent branches only copies `input`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashMap, str::FromStr, sync::Arc};

use crate::workflow::types::{Edge, Node, Workflow};

/// Key under which a node's result lands in `RunContext::input`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKeying {
    /// `input[node_type]`; two nodes of one type overwrite each other (last writer wins)
    #[default]
    NodeType,
    /// `input[node_id]`; every node keeps its own slot
    NodeId,
}

impl OutputKeying {
    pub fn key_for<'a>(self, node_id: &'a str, node_type: &'a str) -> &'a str {
        match self {
            OutputKeying::NodeType => node_type,
            OutputKeying::NodeId => node_id,
        }
    }
}

impl FromStr for OutputKeying {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "node-type" | "type" => Ok(OutputKeying::NodeType),
            "node-id" | "id" => Ok(OutputKeying::NodeId),
            other => Err(format!("unknown output keying '{}'", other)),
        }
    }
}

/// Immutable view of the workflow for the duration of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: HashMap<String, Node>,
    pub edges: HashMap<String, Edge>,
}

impl GraphSnapshot {
    pub fn from_workflow(workflow: &Workflow) -> Self {
        Self {
            nodes: workflow
                .nodes
                .iter()
                .map(|n| (n.id.clone(), n.clone()))
                .collect(),
            edges: workflow
                .edges
                .iter()
                .map(|e| (e.id.clone(), e.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub input: Map<String, Value>,
    pub state: Arc<GraphSnapshot>,
}

impl RunContext {
    /// Seed a run from a workflow
    ///
    /// The trigger node's payload goes in first: `trigger_payload` when the caller
    /// supplies one (webhook body, schedule tick), otherwise the trigger's cached
    /// `data.output`. Workflows without a trigger get an empty `input`.
    pub fn seed(workflow: &Workflow, trigger_payload: Option<Value>, keying: OutputKeying) -> Self {
        let mut input = Map::new();
        if let Some(trigger) = workflow.trigger_node() {
            let payload = trigger_payload
                .or_else(|| trigger.data.output.clone())
                .unwrap_or(Value::Null);
            input.insert(
                keying.key_for(&trigger.id, &trigger.node_type).to_string(),
                payload,
            );
        }

        Self {
            input,
            state: Arc::new(GraphSnapshot::from_workflow(workflow)),
        }
    }

    /// Configuration of a node as stored in the snapshot
    pub fn node_state(&self, node_id: &str) -> Option<&Value> {
        self.state.nodes.get(node_id).map(|n| &n.data.state)
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.state.nodes.get(node_id)
    }

    pub fn record_output(&mut self, key: impl Into<String>, output: Value) {
        self.input.insert(key.into(), output);
    }

    pub fn output(&self, key: &str) -> Option<&Value> {
        self.input.get(key)
    }

    /// Fold the entries `other` added or changed relative to `base` into `self`
    pub fn merge_changes(&mut self, base: &RunContext, other: RunContext) {
        for (key, value) in other.input {
            if base.input.get(&key) != Some(&value) {
                self.input.insert(key, value);
            }
        }
    }
}
