/// Graph compiler
///
/// Validates a workflow and turns it into a `CompiledGraph`: a petgraph DAG whose nodes
/// carry handler closures bound to their node id, plus an explicit `End` step that every
/// sink points to. All structural checks happen here so a bad workflow never reaches a
/// side-effecting handler.

use futures::future::{BoxFuture, FutureExt};
use petgraph::{
    algo::toposort,
    graph::{DiGraph, NodeIndex},
    Direction,
};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use super::{context::RunContext, executor::NodeExecutor};
use crate::{
    error::{CompilationError, NodeExecutionError, UpstreamServiceError},
    workflow::types::{NodeKind, Workflow},
};

/// Handler closure bound to one node id
pub type NodeTask =
    Arc<dyn Fn(RunContext) -> BoxFuture<'static, Result<RunContext, UpstreamServiceError>> + Send + Sync>;

/// A graph node with its handler attached
#[derive(Clone)]
pub struct BoundNode {
    pub node_id: String,
    /// Label shown in the UI, or the id when unlabelled
    pub name: String,
    pub kind: NodeKind,
    task: NodeTask,
}

impl BoundNode {
    pub fn new(node_id: impl Into<String>, name: impl Into<String>, kind: NodeKind, task: NodeTask) -> Self {
        Self {
            node_id: node_id.into(),
            name: name.into(),
            kind,
            task,
        }
    }

    /// Run the handler, pinning any failure to this node
    pub async fn run(&self, ctx: RunContext) -> Result<RunContext, NodeExecutionError> {
        (self.task)(ctx)
            .await
            .map_err(|cause| NodeExecutionError::at(&self.node_id, &self.name, cause))
    }
}

impl std::fmt::Debug for BoundNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundNode")
            .field("node_id", &self.node_id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Task(BoundNode),
    End,
}

/// Executable form of a workflow
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    workflow_id: String,
    graph: DiGraph<Step, ()>,
    index: HashMap<String, NodeIndex>,
    entry: NodeIndex,
    end: NodeIndex,
    terminals: Vec<String>,
    /// Topological order of the nodes reachable from the entry
    order: Vec<NodeIndex>,
}

impl CompiledGraph {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn entry(&self) -> &str {
        self.bound(self.entry).map(|n| n.node_id.as_str()).unwrap_or_default()
    }

    /// Sink nodes wired to the end step
    pub fn terminals(&self) -> &[String] {
        &self.terminals
    }

    pub fn node(&self, node_id: &str) -> Option<&BoundNode> {
        self.index.get(node_id).and_then(|&idx| self.bound(idx))
    }

    /// Nodes to execute, each after all of its reachable predecessors
    pub fn order(&self) -> impl Iterator<Item = &BoundNode> + '_ {
        self.order.iter().filter_map(move |&idx| self.bound(idx))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether `node_id` has a transition to the end step
    pub fn reaches_end(&self, node_id: &str) -> bool {
        self.index
            .get(node_id)
            .is_some_and(|&idx| self.graph.contains_edge(idx, self.end))
    }

    /// Direct predecessors of `node_id`
    pub fn predecessors(&self, node_id: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(node_id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .filter_map(|p| self.bound(p))
            .map(|n| n.node_id.as_str())
            .collect()
    }

    /// Reachable nodes grouped by dependency depth
    ///
    /// A node's depth is one more than the deepest of its reachable predecessors, so
    /// every node in a layer depends only on nodes in earlier layers.
    pub fn layers(&self) -> Vec<Vec<&BoundNode>> {
        let scheduled: HashSet<NodeIndex> = self.order.iter().copied().collect();
        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        let mut layers: Vec<Vec<&BoundNode>> = Vec::new();

        for &idx in &self.order {
            let d = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .filter(|p| scheduled.contains(p))
                .filter_map(|p| depth.get(&p))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(idx, d);

            if let Some(node) = self.bound(idx) {
                if layers.len() <= d {
                    layers.resize_with(d + 1, Vec::new);
                }
                layers[d].push(node);
            }
        }
        layers
    }

    /// Swap the handler of `node_id`
    #[cfg(test)]
    pub(crate) fn replace_task(&mut self, node_id: &str, task: NodeTask) {
        if let Some(&idx) = self.index.get(node_id) {
            if let Step::Task(node) = &mut self.graph[idx] {
                node.task = task;
            }
        }
    }

    fn bound(&self, idx: NodeIndex) -> Option<&BoundNode> {
        match self.graph.node_weight(idx) {
            Some(Step::Task(node)) => Some(node),
            _ => None,
        }
    }
}

/// Builds `CompiledGraph`s whose handlers run on a shared `NodeExecutor`
#[derive(Debug, Clone)]
pub struct GraphCompiler {
    executor: Arc<NodeExecutor>,
}

impl GraphCompiler {
    pub fn new(executor: Arc<NodeExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<NodeExecutor> {
        &self.executor
    }

    pub fn compile(&self, workflow: &Workflow) -> Result<CompiledGraph, CompilationError> {
        tracing::debug!(
            workflow_id = %workflow.id,
            "🏗️ Building workflow graph with {} nodes and {} edges",
            workflow.nodes.len(),
            workflow.edges.len()
        );

        let mut graph: DiGraph<Step, ()> = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();

        // 1. One bound handler per node
        for node in &workflow.nodes {
            if index.contains_key(&node.id) {
                return Err(CompilationError::DuplicateNodeId(node.id.clone()));
            }
            let kind = NodeExecutor::lookup(&node.node_type).ok_or_else(|| CompilationError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            })?;

            let bound = BoundNode::new(&node.id, node.display_name(), kind, self.bind(kind, &node.id));
            let idx = graph.add_node(Step::Task(bound));
            index.insert(node.id.clone(), idx);
            tracing::debug!("  ➕ Added node: '{}' (type: {})", node.id, kind);
        }

        // 2. Wire the edges
        for edge in &workflow.edges {
            let endpoint = |node_id: &str| {
                index
                    .get(node_id)
                    .copied()
                    .ok_or_else(|| CompilationError::UnknownEdgeEndpoint {
                        edge_id: edge.id.clone(),
                        node_id: node_id.to_string(),
                    })
            };
            let from = endpoint(&edge.source)?;
            let to = endpoint(&edge.target)?;
            graph.add_edge(from, to, ());
            tracing::debug!("  🔗 Added edge: '{}' → '{}'", edge.source, edge.target);
        }

        // 3. Entry: first trigger in node order
        let trigger = workflow.trigger_node().ok_or(CompilationError::NoTriggerNode)?;
        let entry = index[&trigger.id];

        let all_sources: HashSet<&str> = workflow.edges.iter().map(|e| e.source.as_str()).collect();
        let all_targets: HashSet<&str> = workflow.edges.iter().map(|e| e.target.as_str()).collect();
        if !workflow.edges.is_empty() && all_sources.difference(&all_targets).next().is_none() {
            return Err(CompilationError::NoEntryNode);
        }

        // 4. Reject cycles before adding the end step
        let topo_order = toposort(&graph, None).map_err(|cycle| CompilationError::CyclicGraph {
            node_id: match &graph[cycle.node_id()] {
                Step::Task(node) => node.node_id.clone(),
                Step::End => String::new(),
            },
        })?;

        // 5. Sinks transition to the end step
        let terminals: Vec<String> = if workflow.edges.is_empty() {
            vec![trigger.id.clone()]
        } else {
            workflow
                .nodes
                .iter()
                .map(|n| n.id.as_str())
                .filter(|id| all_targets.contains(id) && !all_sources.contains(id))
                .map(str::to_string)
                .collect()
        };

        let end = graph.add_node(Step::End);
        for node_id in &terminals {
            graph.add_edge(index[node_id], end, ());
        }

        // 6. Execution order: topological, restricted to what the entry reaches
        let reachable = find_reachable_nodes(&graph, entry);
        let order: Vec<NodeIndex> = topo_order
            .into_iter()
            .filter(|idx| reachable.contains(idx))
            .collect();

        // A runnable node must not wait on something the trigger never runs
        for &idx in &order {
            if let Some(pred) = graph
                .neighbors_directed(idx, Direction::Incoming)
                .find(|p| !reachable.contains(p))
            {
                let name = |i: NodeIndex| match &graph[i] {
                    Step::Task(node) => node.node_id.clone(),
                    Step::End => String::new(),
                };
                return Err(CompilationError::UnreachablePredecessor {
                    node_id: name(idx),
                    predecessor_id: name(pred),
                });
            }
        }

        for node in &workflow.nodes {
            if !reachable.contains(&index[&node.id]) {
                tracing::warn!(
                    workflow_id = %workflow.id,
                    node_id = %node.id,
                    "⏭️ Node is not reachable from trigger '{}' and will not run",
                    trigger.id
                );
            }
        }

        tracing::info!(
            workflow_id = %workflow.id,
            "✅ Compiled workflow: {} runnable nodes, entry '{}', {} terminal(s)",
            order.len(),
            trigger.id,
            terminals.len()
        );

        Ok(CompiledGraph {
            workflow_id: workflow.id.clone(),
            graph,
            index,
            entry,
            end,
            terminals,
            order,
        })
    }

    fn bind(&self, kind: NodeKind, node_id: &str) -> NodeTask {
        let executor = self.executor.clone();
        let node_id = node_id.to_string();
        Arc::new(move |ctx: RunContext| {
            let executor = executor.clone();
            let node_id = node_id.clone();
            async move { executor.execute(kind, ctx, &node_id).await }.boxed()
        })
    }
}

/// All nodes reachable from `start`, including `start`
fn find_reachable_nodes(graph: &DiGraph<Step, ()>, start: NodeIndex) -> HashSet<NodeIndex> {
    let mut reachable = HashSet::new();
    let mut queue = VecDeque::new();

    queue.push_back(start);
    reachable.insert(start);

    while let Some(current) = queue.pop_front() {
        for target in graph.neighbors(current) {
            if matches!(graph[target], Step::Task(_)) && reachable.insert(target) {
                queue.push_back(target);
            }
        }
    }

    reachable
}
