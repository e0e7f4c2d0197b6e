/// SQLite persistence for workflow snapshots
///
/// A workflow is stored whole, as the JSON the canvas sent, next to a few columns
/// extracted for listing. The engine never reads from here directly: snapshots are
/// loaded into the registry and served from memory.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;

use crate::workflow::types::Workflow;

#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    pool: SqlitePool,
}

/// Row summary for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub node_count: i64,
    /// Type tag of the trigger the run would start from, if any
    pub trigger_type: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl WorkflowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the workflows table (safe to call repeatedly)
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                node_count INTEGER NOT NULL DEFAULT 0,
                trigger_type TEXT,
                snapshot JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or replace a snapshot
    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        let snapshot = serde_json::to_string(workflow)?;
        let trigger_type = workflow.trigger_node().map(|n| n.node_type.clone());

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, description, node_count, trigger_type, snapshot, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                node_count = excluded.node_count,
                trigger_type = excluded.trigger_type,
                snapshot = excluded.snapshot,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.nodes.len() as i64)
        .bind(trigger_type)
        .bind(&snapshot)
        .execute(&self.pool)
        .await?;

        tracing::debug!(workflow_id = %workflow.id, "💾 Saved workflow snapshot");
        Ok(())
    }

    pub async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT snapshot FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| decode_snapshot(id, row.get("snapshot")))
            .transpose()
    }

    /// Summaries, most recently updated first
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, node_count, trigger_type, created_at, updated_at
            FROM workflows ORDER BY updated_at DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| WorkflowSummary {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
                node_count: row.get("node_count"),
                trigger_type: row.get("trigger_type"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    /// Every snapshot keyed by id, for registry start-up
    pub async fn load_all_workflows(&self) -> Result<HashMap<String, Workflow>> {
        let rows = sqlx::query("SELECT id, snapshot FROM workflows")
            .fetch_all(&self.pool)
            .await?;

        let mut workflows = HashMap::new();
        for row in rows {
            let id: String = row.get("id");
            let workflow = decode_snapshot(&id, row.get("snapshot"))?;
            workflows.insert(id, workflow);
        }

        Ok(workflows)
    }

    pub async fn delete_workflow(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn decode_snapshot(id: &str, snapshot: String) -> Result<Workflow> {
    serde_json::from_str(&snapshot).with_context(|| format!("corrupt snapshot for workflow '{}'", id))
}
