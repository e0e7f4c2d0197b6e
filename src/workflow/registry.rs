/// Hot-reload workflow registry using ArcSwap
///
/// Holds every stored workflow snapshot in memory behind an atomically swapped map.
/// Writers go through storage first and then swap in a new map; readers (executor,
/// webhooks, scheduler ticks) take a lock-free snapshot and never block a save.

use anyhow::Result;
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

use crate::workflow::{
    storage::{WorkflowStorage, WorkflowSummary},
    types::Workflow,
};

#[derive(Debug)]
pub struct WorkflowRegistry {
    workflows: ArcSwap<HashMap<String, Arc<Workflow>>>,
    storage: WorkflowStorage,
}

impl WorkflowRegistry {
    pub fn new(storage: WorkflowStorage) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Populate from storage at start-up
    pub async fn init_from_storage(&self) -> Result<()> {
        let stored = self.storage.load_all_workflows().await?;
        let loaded: HashMap<String, Arc<Workflow>> = stored
            .into_iter()
            .map(|(id, workflow)| (id, Arc::new(workflow)))
            .collect();

        self.workflows.store(Arc::new(loaded));
        tracing::info!("Initialized workflow registry with {} workflows", self.workflows.load().len());
        Ok(())
    }

    /// Persist a snapshot and make it visible to new runs
    pub async fn save_workflow(&self, workflow: Workflow) -> Result<Arc<Workflow>> {
        self.storage.save_workflow(&workflow).await?;

        let workflow = Arc::new(workflow);
        let inserted = Arc::clone(&workflow);
        self.workflows.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(inserted.id.clone(), Arc::clone(&inserted));
            next
        });

        tracing::info!("Hot-reloaded workflow: {}", workflow.id);
        Ok(workflow)
    }

    /// Lock-free lookup
    pub fn get_workflow(&self, workflow_id: &str) -> Option<Arc<Workflow>> {
        self.workflows.load().get(workflow_id).cloned()
    }

    pub fn get_all_workflows(&self) -> Vec<Arc<Workflow>> {
        self.workflows.load().values().cloned().collect()
    }

    pub fn list_workflow_ids(&self) -> Vec<String> {
        self.workflows.load().keys().cloned().collect()
    }

    pub async fn list_summaries(&self) -> Result<Vec<WorkflowSummary>> {
        self.storage.list_workflows().await
    }

    /// Delete from storage and memory; `false` when it did not exist
    pub async fn remove_workflow(&self, workflow_id: &str) -> Result<bool> {
        let deleted = self.storage.delete_workflow(workflow_id).await?;

        let mut removed = false;
        self.workflows.rcu(|current| {
            let mut next = (**current).clone();
            removed = next.remove(workflow_id).is_some();
            next
        });

        if deleted || removed {
            tracing::info!("Removed workflow from registry: {}", workflow_id);
        }
        Ok(deleted || removed)
    }
}
