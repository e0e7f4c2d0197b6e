/// Compile-seed-execute in one place
///
/// Every entry point (HTTP executor, websocket, webhook, schedule) runs a workflow the
/// same way: compile the snapshot, seed a `RunContext` from the trigger payload, then
/// invoke or stream it.

use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::{
    compiler::{CompiledGraph, GraphCompiler},
    context::{OutputKeying, RunContext},
    engine::{ExecutionEngine, TraversalStrategy},
    events::RunEvent,
    executor::NodeExecutor,
};
use crate::{
    error::{CompilationError, EngineError},
    workflow::types::Workflow,
};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct WorkflowRunner {
    compiler: GraphCompiler,
    engine: ExecutionEngine,
    keying: OutputKeying,
}

impl WorkflowRunner {
    pub fn new(executor: Arc<NodeExecutor>, traversal: TraversalStrategy) -> Self {
        let keying = executor.keying();
        Self {
            compiler: GraphCompiler::new(executor),
            engine: ExecutionEngine::new(traversal),
            keying,
        }
    }

    pub fn compile(&self, workflow: &Workflow) -> Result<CompiledGraph, CompilationError> {
        self.compiler.compile(workflow)
    }

    /// Seed context: `payload` overrides the trigger's cached output when given
    pub fn seed(&self, workflow: &Workflow, payload: Option<Value>) -> RunContext {
        RunContext::seed(workflow, payload, self.keying)
    }

    pub async fn invoke(
        &self,
        workflow: &Workflow,
        payload: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<RunContext, EngineError> {
        let graph = self.compile(workflow)?;
        self.engine.invoke(&graph, self.seed(workflow, payload), cancel).await
    }

    /// Compilation errors are returned before anything is spawned
    pub fn stream(
        &self,
        workflow: &Workflow,
        payload: Option<Value>,
        cancel: CancellationToken,
    ) -> Result<ReceiverStream<RunEvent>, CompilationError> {
        let graph = self.compile(workflow)?;
        Ok(self.engine.stream(graph, self.seed(workflow, payload), cancel))
    }
}
