/// Petgraph-based DAG execution engine
///
/// Runs a `CompiledGraph` against a seeded `RunContext`. `invoke` returns the final
/// context; `stream` yields a progress event per finished node and ends with exactly one
/// `completed` or `failed` event. The first failing node stops the run.
///
/// Cancellation is checked before each node and raced against the running handler, so
/// a long HTTP call or sleep is abandoned as soon as the token fires.

use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Instant};
use tokio::{sync::mpsc, task::JoinError};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    compiler::{BoundNode, CompiledGraph},
    context::RunContext,
    events::RunEvent,
};
use crate::error::{EngineError, NodeExecutionError, UpstreamServiceError};

const STREAM_BUFFER: usize = 32;

/// How independent nodes are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraversalStrategy {
    /// One node at a time in topological order
    #[default]
    Sequential,
    /// Nodes of equal dependency depth run concurrently; outputs are merged after each layer
    Layered,
}

impl FromStr for TraversalStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(TraversalStrategy::Sequential),
            "layered" | "parallel" => Ok(TraversalStrategy::Layered),
            other => Err(format!("unknown traversal strategy '{}'", other)),
        }
    }
}

/// DAG execution engine
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionEngine {
    traversal: TraversalStrategy,
}

impl ExecutionEngine {
    pub fn new(traversal: TraversalStrategy) -> Self {
        Self { traversal }
    }

    pub fn traversal(&self) -> TraversalStrategy {
        self.traversal
    }

    /// Run to completion and return the final context
    pub async fn invoke(
        &self,
        graph: &CompiledGraph,
        ctx: RunContext,
        cancel: &CancellationToken,
    ) -> Result<RunContext, EngineError> {
        self.run(graph, ctx, cancel, None).await
    }

    /// Run in the background, yielding events as nodes finish
    ///
    /// Dropping the returned stream cancels the run.
    pub fn stream(
        &self,
        graph: CompiledGraph,
        ctx: RunContext,
        cancel: CancellationToken,
    ) -> ReceiverStream<RunEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let engine = *self;

        tokio::spawn(async move {
            let workflow_id = graph.workflow_id().to_string();
            let watcher = {
                let tx = tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tx.closed() => {
                            tracing::debug!("🔌 Stream receiver dropped, cancelling run");
                            cancel.cancel();
                        }
                        _ = cancel.cancelled() => {}
                    }
                })
            };
            let run = {
                let tx = tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { engine.run(&graph, ctx, &cancel, Some(&tx)).await.map(drop) })
            };

            let outcome = run.await.unwrap_or_else(|e| Err(aborted(&workflow_id, e)));
            watcher.abort();

            let terminal = match outcome {
                Ok(()) => RunEvent::Completed,
                Err(e) => RunEvent::from_error(&e),
            };
            if tx.send(terminal).await.is_err() {
                tracing::debug!("📭 No receiver for terminal event of workflow '{}'", workflow_id);
            }
        });

        ReceiverStream::new(rx)
    }

    async fn run(
        &self,
        graph: &CompiledGraph,
        mut ctx: RunContext,
        cancel: &CancellationToken,
        progress: Option<&mpsc::Sender<RunEvent>>,
    ) -> Result<RunContext, EngineError> {
        let run_id = Uuid::new_v4();
        let workflow_start_time = Instant::now();
        tracing::info!(
            %run_id,
            workflow_id = %graph.workflow_id(),
            "🚀 Starting workflow execution from node '{}' ({:?}, {} nodes)",
            graph.entry(),
            self.traversal,
            graph.len()
        );

        let result = match self.traversal {
            TraversalStrategy::Sequential => {
                let total = graph.len();
                for (step_num, node) in graph.order().enumerate() {
                    tracing::info!(
                        %run_id,
                        "📍 Step {}/{}: Executing node '{}' (type: {})",
                        step_num + 1,
                        total,
                        node.node_id,
                        node.kind
                    );
                    ctx = match step(node, ctx, cancel).await {
                        Ok(next) => next,
                        Err(e) => return finish(run_id, graph, workflow_start_time, Err(e)),
                    };
                    emit(progress, cancel, RunEvent::progress(&node.node_id, ctx.clone())).await;
                }
                Ok(ctx)
            }
            TraversalStrategy::Layered => {
                for (depth, layer) in graph.layers().into_iter().enumerate() {
                    tracing::info!(%run_id, "📍 Layer {}: executing {} node(s)", depth, layer.len());
                    let base = ctx.clone();
                    let outputs = futures::future::try_join_all(
                        layer.iter().map(|node| step(node, base.clone(), cancel)),
                    )
                    .await;
                    let outputs = match outputs {
                        Ok(outputs) => outputs,
                        Err(e) => return finish(run_id, graph, workflow_start_time, Err(e)),
                    };
                    for (node, out) in layer.iter().zip(outputs) {
                        // Each event shows the layer's input plus this node's own writes
                        let partial = out.clone();
                        ctx.merge_changes(&base, out);
                        emit(progress, cancel, RunEvent::progress(&node.node_id, partial)).await;
                    }
                }
                Ok(ctx)
            }
        };

        finish(run_id, graph, workflow_start_time, result)
    }
}

/// Execute one node unless the run has been cancelled
async fn step(node: &BoundNode, ctx: RunContext, cancel: &CancellationToken) -> Result<RunContext, EngineError> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        result = node.run(ctx) => result.map_err(EngineError::from),
    }
}

/// A run task that died without returning fails the run with no node attached
fn aborted(workflow_id: &str, err: JoinError) -> EngineError {
    tracing::error!("💥 Workflow '{}' run task aborted: {}", workflow_id, err);
    EngineError::Execution(NodeExecutionError::unattributed(UpstreamServiceError::Aborted(
        err.to_string(),
    )))
}

/// Forward a progress event; a closed channel cancels the run
async fn emit(progress: Option<&mpsc::Sender<RunEvent>>, cancel: &CancellationToken, event: RunEvent) {
    if let Some(tx) = progress {
        if tx.send(event).await.is_err() {
            cancel.cancel();
        }
    }
}

fn finish(
    run_id: Uuid,
    graph: &CompiledGraph,
    started: Instant,
    result: Result<RunContext, EngineError>,
) -> Result<RunContext, EngineError> {
    let duration = started.elapsed();
    match &result {
        Ok(_) => tracing::info!(
            %run_id,
            "🎉 Workflow '{}' execution completed successfully in {:?}",
            graph.workflow_id(),
            duration
        ),
        Err(EngineError::Cancelled) => tracing::warn!(
            %run_id,
            "⏹️ Workflow '{}' cancelled after {:?}",
            graph.workflow_id(),
            duration
        ),
        Err(e) => tracing::error!(
            %run_id,
            "❌ Workflow '{}' failed after {:?}: {}",
            graph.workflow_id(),
            duration,
            e
        ),
    }
    result
}
