/// Background scheduler for `schedule-trigger` nodes
///
/// Registers one tokio-cron-scheduler job per active schedule trigger. A workflow's
/// jobs are replaced wholesale whenever it is saved and dropped when it is deleted.
/// Each firing re-reads the current snapshot from the registry, so an edited workflow
/// runs its latest version without re-registration. Failures go to the log; there is
/// no live caller to report to.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::runner::WorkflowRunner;
use crate::workflow::{
    registry::WorkflowRegistry,
    types::{Node, NodeKind, Workflow},
};

/// Schedule settings stored in a schedule trigger's `data.state`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    #[serde(default)]
    pub schedule_type: String,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub specific_date: Option<String>,
    #[serde(default)]
    pub schedule_status: Option<String>,
}

/// What a schedule trigger resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Six-field cron expression (seconds first)
    Cron(String),
    /// Single run at the given instant
    Once(DateTime<Utc>),
}

impl ScheduleConfig {
    pub fn from_node(node: &Node) -> Result<Self> {
        if node.data.state.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(node.data.state.clone())
            .map_err(|e| anyhow!("invalid schedule on node '{}': {}", node.id, e))
    }

    pub fn is_paused(&self) -> bool {
        self.schedule_status.as_deref() == Some("paused")
    }

    /// Resolve to a schedule; `Ok(None)` when there is nothing to register
    pub fn schedule(&self, now: DateTime<Utc>) -> Result<Option<Schedule>> {
        if self.is_paused() {
            return Ok(None);
        }

        match self.schedule_type.as_str() {
            "cron" | "interval" => {
                let expr = self
                    .cron_expression
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .ok_or_else(|| anyhow!("cron schedule without cronExpression"))?;
                Ok(Some(Schedule::Cron(normalize_cron(expr))))
            }
            "once" => {
                let raw = self
                    .specific_date
                    .as_deref()
                    .ok_or_else(|| anyhow!("one-shot schedule without specificDate"))?;
                let at = DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| anyhow!("invalid specificDate '{}': {}", raw, e))?
                    .with_timezone(&Utc);
                Ok((at > now).then_some(Schedule::Once(at)))
            }
            "" => Ok(None),
            other => Err(anyhow!("unknown scheduleType '{}'", other)),
        }
    }
}

/// Standard five-field cron gets a leading seconds field
pub fn normalize_cron(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    }
}

/// Input seeded into the trigger slot for a scheduled run
pub fn trigger_payload(workflow_id: &str, schedule_type: &str, at: DateTime<Utc>) -> Value {
    json!({
        "triggered_at": at.to_rfc3339(),
        "schedule_type": schedule_type,
        "workflow_id": workflow_id,
    })
}

/// Hot-reloading scheduler service
pub struct ScheduleService {
    scheduler: Arc<RwLock<JobScheduler>>,
    /// "workflow_id:node_id" -> scheduler job id
    job_uuid_map: Arc<RwLock<HashMap<String, Uuid>>>,
    registry: Arc<WorkflowRegistry>,
    runner: Arc<WorkflowRunner>,
}

impl ScheduleService {
    pub async fn new(registry: Arc<WorkflowRegistry>, runner: Arc<WorkflowRunner>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            job_uuid_map: Arc::new(RwLock::new(HashMap::new())),
            registry,
            runner,
        })
    }

    /// Register every stored schedule and start ticking
    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting schedule service");

        let workflows = self.registry.get_all_workflows();
        let workflow_count = workflows.len();
        let mut total = 0;
        for workflow in workflows {
            total += self.sync_workflow(&workflow).await;
        }

        self.scheduler.read().await.start().await?;
        tracing::info!("📊 Registered {} schedules from {} workflows", total, workflow_count);
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping schedule service");
        self.job_uuid_map.write().await.clear();
        self.scheduler.write().await.shutdown().await?;
        Ok(())
    }

    /// Replace the workflow's jobs with its current schedule triggers
    ///
    /// Returns the number of jobs registered. A bad trigger is logged and skipped so
    /// one broken schedule does not block the rest.
    pub async fn sync_workflow(&self, workflow: &Workflow) -> usize {
        self.remove_workflow(&workflow.id).await;

        let mut registered = 0;
        for node in workflow.nodes_of_kind(NodeKind::ScheduleTrigger) {
            match self.add_job(&workflow.id, node).await {
                Ok(true) => registered += 1,
                Ok(false) => {
                    tracing::debug!(workflow_id = %workflow.id, node_id = %node.id, "⏭️ Schedule inactive, not registered")
                }
                Err(e) => {
                    tracing::warn!(workflow_id = %workflow.id, node_id = %node.id, "⚠️ Skipping schedule: {}", e)
                }
            }
        }
        registered
    }

    /// Drop every job belonging to `workflow_id`
    pub async fn remove_workflow(&self, workflow_id: &str) {
        let prefix = format!("{}:", workflow_id);
        let mut job_uuid_map = self.job_uuid_map.write().await;
        let keys: Vec<String> = job_uuid_map
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();

        for key in keys {
            if let Some(job_uuid) = job_uuid_map.remove(&key) {
                let scheduler = self.scheduler.read().await;
                if let Err(e) = scheduler.remove(&job_uuid).await {
                    tracing::warn!("⚠️ Failed to remove job {} from scheduler: {}", key, e);
                } else {
                    tracing::debug!("🛑 Removed scheduled job: {}", key);
                }
            }
        }
    }

    pub async fn job_count(&self) -> usize {
        self.job_uuid_map.read().await.len()
    }

    async fn add_job(&self, workflow_id: &str, node: &Node) -> Result<bool> {
        let config = ScheduleConfig::from_node(node)?;
        let Some(schedule) = config.schedule(Utc::now())? else {
            return Ok(false);
        };

        let job_id = format!("{}:{}", workflow_id, node.id);
        let fire = FireContext {
            workflow_id: workflow_id.to_string(),
            schedule_type: config.schedule_type.clone(),
            registry: Arc::clone(&self.registry),
            runner: Arc::clone(&self.runner),
        };

        let job = match &schedule {
            Schedule::Cron(expr) => Job::new_async(expr.as_str(), move |_uuid, _l| {
                let fire = fire.clone();
                Box::pin(async move { fire.run().await })
            })?,
            Schedule::Once(at) => {
                let delay = (*at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                Job::new_one_shot_async(delay, move |_uuid, _l| {
                    let fire = fire.clone();
                    Box::pin(async move { fire.run().await })
                })?
            }
        };

        let job_uuid = self.scheduler.write().await.add(job).await?;
        self.job_uuid_map.write().await.insert(job_id.clone(), job_uuid);

        tracing::info!("🔥 Scheduled job {} ({:?})", job_id, schedule);
        Ok(true)
    }
}

/// Everything a firing job needs, cloned into each tick
#[derive(Clone)]
struct FireContext {
    workflow_id: String,
    schedule_type: String,
    registry: Arc<WorkflowRegistry>,
    runner: Arc<WorkflowRunner>,
}

impl FireContext {
    async fn run(&self) {
        let Some(workflow) = self.registry.get_workflow(&self.workflow_id) else {
            tracing::debug!("⏭️ Skipping schedule for deleted workflow: {}", self.workflow_id);
            return;
        };

        tracing::info!("🔔 Scheduled run of workflow {}", self.workflow_id);
        let payload = trigger_payload(&self.workflow_id, &self.schedule_type, Utc::now());
        match self
            .runner
            .invoke(&workflow, Some(payload), &CancellationToken::new())
            .await
        {
            Ok(ctx) => tracing::info!(
                "✅ Scheduled workflow completed: {} ({} outputs)",
                self.workflow_id,
                ctx.input.len()
            ),
            Err(e) => {
                let (name, id) = e.failed_node();
                tracing::error!(
                    failed_node_id = ?id,
                    failed_node_name = ?name,
                    "❌ Scheduled workflow failed: {} - Error: {}",
                    self.workflow_id,
                    e
                );
            }
        }
    }
}
