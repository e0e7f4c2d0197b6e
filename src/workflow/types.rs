/// Core workflow type definitions
///
/// Workflows arrive from the canvas as JSON: a list of nodes and a list of edges.
/// These types mirror that shape. UI-only fields (position, selection, styling)
/// are carried through `extra` untouched so a snapshot can be stored and served back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TRIGGER_MARKER;

/// A complete workflow definition containing nodes and their connections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier; PUT bodies may omit it
    #[serde(default)]
    pub id: String,
    /// Human-readable workflow name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Nodes in canvas order; the compiler picks the first trigger in this order
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Workflow {
    /// Look up a node by id
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// First node (in canvas order) whose type tag carries the trigger marker
    pub fn trigger_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_trigger())
    }

    /// All nodes of the given kind
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.kind() == Some(kind))
    }
}

/// A single computation step in the workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Wire tag, e.g. "form-trigger" or "http-programming-tool"
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: NodeData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: NodeData::default(),
            extra: Map::new(),
        }
    }

    /// Set the templated configuration
    pub fn with_state(mut self, state: Value) -> Self {
        self.data.state = state;
        self
    }

    /// Set the cached output (trigger nodes carry their last payload here)
    pub fn with_output(mut self, output: Value) -> Self {
        self.data.output = Some(output);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = Some(label.into());
        self
    }

    /// Resolved kind, `None` when the tag has no behavior
    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::from_tag(&self.node_type)
    }

    pub fn is_trigger(&self) -> bool {
        self.node_type.contains(TRIGGER_MARKER)
    }

    /// Display name: the label when set, otherwise the id
    pub fn display_name(&self) -> &str {
        self.data
            .label
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

/// Per-node payload from the canvas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Free-form configuration; string fields may embed `{{$path}}` placeholders
    #[serde(default)]
    pub state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Directed dependency `source -> target`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            extra: Map::new(),
        }
    }
}

/// Node kinds the engine knows how to run
///
/// Closed set: a tag that does not map to one of these fails compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    ManualTrigger,
    ScheduleTrigger,
    WebhookTrigger,
    FormTrigger,
    /// Chat completion against OpenAI
    OpenAiTool,
    /// Chat completion against Gemini's OpenAI-compatible endpoint
    GeminiAiTool,
    /// Outbound HTTP request
    HttpTool,
    /// Email through the mail provider's HTTP API
    MailTool,
    /// Pure text formatting: labelled fields to an object
    TextTool,
    /// Delay
    SleepTool,
}

impl NodeKind {
    pub const ALL: [NodeKind; 10] = [
        NodeKind::ManualTrigger,
        NodeKind::ScheduleTrigger,
        NodeKind::WebhookTrigger,
        NodeKind::FormTrigger,
        NodeKind::OpenAiTool,
        NodeKind::GeminiAiTool,
        NodeKind::HttpTool,
        NodeKind::MailTool,
        NodeKind::TextTool,
        NodeKind::SleepTool,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            NodeKind::ManualTrigger => "manual-trigger",
            NodeKind::ScheduleTrigger => "schedule-trigger",
            NodeKind::WebhookTrigger => "webhook-trigger",
            NodeKind::FormTrigger => "form-trigger",
            NodeKind::OpenAiTool => "open-ai-tool",
            NodeKind::GeminiAiTool => "gemini-ai-tool",
            NodeKind::HttpTool => "http-programming-tool",
            NodeKind::MailTool => "mail-other-tool",
            NodeKind::TextTool => "text-other-tool",
            NodeKind::SleepTool => "sleep-other-tool",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    pub fn is_trigger(self) -> bool {
        matches!(
            self,
            NodeKind::ManualTrigger
                | NodeKind::ScheduleTrigger
                | NodeKind::WebhookTrigger
                | NodeKind::FormTrigger
        )
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
