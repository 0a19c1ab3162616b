use std::str::FromStr;

use agentkit_workflow::{Workflow, WorkflowEdge, WorkflowNode, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::types::{Integration, NodeRun, WorkflowRun};
use crate::{Error, Store};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Connect to a database URL, creating the file if missing.
  pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

    // An in-memory database exists per connection; a wider pool would hand
    // each caller an empty schema.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
      .max_connections(max_connections)
      .connect_with(options)
      .await?;
    Ok(Self::new(pool))
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }

  async fn load_nodes(&self, workflow_id: &str) -> Result<Vec<WorkflowNode>, Error> {
    let rows: Vec<NodeRow> = sqlx::query_as(
      r#"
            SELECT id, node_key, type, position_x, position_y, data, custom_node_id
            FROM workflow_nodes
            WHERE workflow_id = ?
            ORDER BY rowid
            "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(NodeRow::into_node).collect())
  }

  async fn load_edges(&self, workflow_id: &str) -> Result<Vec<WorkflowEdge>, Error> {
    let rows: Vec<EdgeRow> = sqlx::query_as(
      r#"
            SELECT id, source, target, source_handle, target_handle, condition
            FROM workflow_edges
            WHERE workflow_id = ?
            ORDER BY rowid
            "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(EdgeRow::into_edge).collect())
  }

  async fn load_node_runs(&self, run_id: &str) -> Result<Vec<NodeRun>, Error> {
    let node_runs = sqlx::query_as(
      r#"
            SELECT id, run_id, node_id, node_key, status, input_data, output_data,
                   error, execution_time_ms, token_usage, started_at, completed_at
            FROM node_runs
            WHERE run_id = ?
            ORDER BY started_at ASC, rowid ASC
            "#,
    )
    .bind(run_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(node_runs)
  }

  async fn assemble_workflow(&self, row: WorkflowRow) -> Result<Workflow, Error> {
    let nodes = self.load_nodes(&row.id).await?;
    let edges = self.load_edges(&row.id).await?;
    row.into_workflow(nodes, edges)
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn ensure_user(&self, email: &str) -> Result<String, Error> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
      .bind(email)
      .fetch_optional(&self.pool)
      .await?;

    if let Some((id,)) = existing {
      return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
      r#"
            INSERT INTO users (id, email, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
    )
    .bind(&id)
    .bind(email)
    .bind(now)
    .bind(now)
    .execute(&self.pool)
    .await?;

    Ok(id)
  }

  async fn create_workflow(&self, workflow: &Workflow) -> Result<(), Error> {
    let mut tx = self.pool.begin().await?;

    sqlx::query(
            r#"
            INSERT INTO workflows (id, user_id, agent_id, name, description, status, variables, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.user_id)
        .bind(&workflow.agent_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.status.as_str())
        .bind(Json(&workflow.variables))
        .bind(Json(&workflow.metadata))
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&mut *tx)
        .await?;

    for node in &workflow.nodes {
      sqlx::query(
                r#"
                INSERT INTO workflow_nodes (id, workflow_id, node_key, type, position_x, position_y, data, custom_node_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&node.id)
            .bind(&workflow.id)
            .bind(&node.node_key)
            .bind(&node.node_type)
            .bind(node.position_x)
            .bind(node.position_y)
            .bind(Json(&node.data))
            .bind(&node.custom_node_id)
            .execute(&mut *tx)
            .await?;
    }

    for edge in &workflow.edges {
      sqlx::query(
                r#"
                INSERT INTO workflow_edges (id, workflow_id, source, target, source_handle, target_handle, condition)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&edge.id)
            .bind(&workflow.id)
            .bind(&edge.source)
            .bind(&edge.target)
            .bind(&edge.source_handle)
            .bind(&edge.target_handle)
            .bind(&edge.condition)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
  }

  async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, Error> {
    let row: Option<WorkflowRow> = sqlx::query_as(
      r#"
            SELECT id, user_id, agent_id, name, description, status, variables, metadata, created_at, updated_at
            FROM workflows
            WHERE id = ?
            "#,
    )
    .bind(workflow_id)
    .fetch_optional(&self.pool)
    .await?;

    let row = row.ok_or_else(|| Error::NotFound(format!("workflow {}", workflow_id)))?;
    self.assemble_workflow(row).await
  }

  async fn list_workflows(
    &self,
    user_id: &str,
    status: Option<WorkflowStatus>,
  ) -> Result<Vec<Workflow>, Error> {
    let rows: Vec<WorkflowRow> = match status {
      Some(status) => {
        sqlx::query_as(
          r#"
                SELECT id, user_id, agent_id, name, description, status, variables, metadata, created_at, updated_at
                FROM workflows
                WHERE user_id = ? AND status = ?
                ORDER BY created_at DESC
                "#,
        )
        .bind(user_id)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?
      }
      None => {
        sqlx::query_as(
          r#"
                SELECT id, user_id, agent_id, name, description, status, variables, metadata, created_at, updated_at
                FROM workflows
                WHERE user_id = ?
                ORDER BY created_at DESC
                "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
      }
    };

    let mut workflows = Vec::with_capacity(rows.len());
    for row in rows {
      workflows.push(self.assemble_workflow(row).await?);
    }
    Ok(workflows)
  }

  async fn create_run(&self, run: &WorkflowRun) -> Result<(), Error> {
    sqlx::query(
            r#"
            INSERT INTO workflow_runs (id, workflow_id, status, trigger_type, input_payload, output_payload, error, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.workflow_id)
        .bind(run.status)
        .bind(run.trigger_kind)
        .bind(&run.input_payload)
        .bind(&run.output_payload)
        .bind(&run.error)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await?;

    Ok(())
  }

  async fn update_run(&self, run: &WorkflowRun) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE workflow_runs
            SET status = ?, output_payload = ?, error = ?, completed_at = ?
            WHERE id = ?
            "#,
    )
    .bind(run.status)
    .bind(&run.output_payload)
    .bind(&run.error)
    .bind(run.completed_at)
    .bind(&run.id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, Error> {
    let run: Option<WorkflowRun> = sqlx::query_as(
      r#"
            SELECT id, workflow_id, status, trigger_type, input_payload, output_payload, error, started_at, completed_at
            FROM workflow_runs
            WHERE id = ?
            "#,
    )
    .bind(run_id)
    .fetch_optional(&self.pool)
    .await?;

    let mut run = run.ok_or_else(|| Error::NotFound(format!("run {}", run_id)))?;
    run.node_runs = self.load_node_runs(&run.id).await?;
    Ok(run)
  }

  async fn list_runs(
    &self,
    user_id: &str,
    workflow_id: Option<&str>,
    limit: i64,
  ) -> Result<Vec<WorkflowRun>, Error> {
    let mut runs: Vec<WorkflowRun> = match workflow_id {
      Some(workflow_id) => {
        sqlx::query_as(
          r#"
                SELECT r.id, r.workflow_id, r.status, r.trigger_type, r.input_payload,
                       r.output_payload, r.error, r.started_at, r.completed_at
                FROM workflow_runs r
                JOIN workflows w ON r.workflow_id = w.id
                WHERE w.user_id = ? AND r.workflow_id = ?
                ORDER BY r.started_at DESC
                LIMIT ?
                "#,
        )
        .bind(user_id)
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
      }
      None => {
        sqlx::query_as(
          r#"
                SELECT r.id, r.workflow_id, r.status, r.trigger_type, r.input_payload,
                       r.output_payload, r.error, r.started_at, r.completed_at
                FROM workflow_runs r
                JOIN workflows w ON r.workflow_id = w.id
                WHERE w.user_id = ?
                ORDER BY r.started_at DESC
                LIMIT ?
                "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
      }
    };

    for run in &mut runs {
      run.node_runs = self.load_node_runs(&run.id).await?;
    }
    Ok(runs)
  }

  async fn create_node_run(&self, node_run: &NodeRun) -> Result<(), Error> {
    sqlx::query(
            r#"
            INSERT INTO node_runs (id, run_id, node_id, node_key, status, input_data, output_data, error, execution_time_ms, token_usage, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node_run.id)
        .bind(&node_run.run_id)
        .bind(&node_run.node_id)
        .bind(&node_run.node_key)
        .bind(node_run.status)
        .bind(&node_run.input_data)
        .bind(&node_run.output_data)
        .bind(&node_run.error)
        .bind(node_run.execution_time_ms)
        .bind(&node_run.token_usage)
        .bind(node_run.started_at)
        .bind(node_run.completed_at)
        .execute(&self.pool)
        .await?;

    Ok(())
  }

  async fn update_node_run(&self, node_run: &NodeRun) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE node_runs
            SET node_key = ?, status = ?, input_data = ?, output_data = ?, error = ?,
                execution_time_ms = ?, token_usage = ?, completed_at = ?
            WHERE id = ?
            "#,
    )
    .bind(&node_run.node_key)
    .bind(node_run.status)
    .bind(&node_run.input_data)
    .bind(&node_run.output_data)
    .bind(&node_run.error)
    .bind(node_run.execution_time_ms)
    .bind(&node_run.token_usage)
    .bind(node_run.completed_at)
    .bind(&node_run.id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn create_integration(&self, integration: &Integration) -> Result<(), Error> {
    sqlx::query(
            r#"
            INSERT INTO integrations (id, user_id, name, type, credentials_sealed, status, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&integration.id)
        .bind(&integration.user_id)
        .bind(&integration.name)
        .bind(&integration.kind)
        .bind(&integration.credentials_sealed)
        .bind(&integration.status)
        .bind(&integration.metadata)
        .bind(integration.created_at)
        .bind(integration.updated_at)
        .execute(&self.pool)
        .await?;

    Ok(())
  }

  async fn get_integration(&self, integration_id: &str) -> Result<Integration, Error> {
    let integration: Option<Integration> = sqlx::query_as(
      r#"
            SELECT id, user_id, name, type, credentials_sealed, status, metadata, created_at, updated_at
            FROM integrations
            WHERE id = ?
            "#,
    )
    .bind(integration_id)
    .fetch_optional(&self.pool)
    .await?;

    integration.ok_or_else(|| Error::NotFound(format!("integration {}", integration_id)))
  }

  async fn list_integrations(&self, kind: &str, status: &str) -> Result<Vec<Integration>, Error> {
    let integrations = sqlx::query_as(
      r#"
            SELECT id, user_id, name, type, credentials_sealed, status, metadata, created_at, updated_at
            FROM integrations
            WHERE type = ? AND status = ?
            ORDER BY created_at ASC
            "#,
    )
    .bind(kind)
    .bind(status)
    .fetch_all(&self.pool)
    .await?;

    Ok(integrations)
  }

  async fn update_integration_credentials(
    &self,
    integration_id: &str,
    sealed: &str,
  ) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE integrations
            SET credentials_sealed = ?, updated_at = ?
            WHERE id = ?
            "#,
    )
    .bind(sealed)
    .bind(Utc::now())
    .bind(integration_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}

/// Raw workflow row; graph loaded separately.
#[derive(Debug, FromRow)]
struct WorkflowRow {
  id: String,
  user_id: String,
  agent_id: Option<String>,
  name: String,
  description: String,
  status: String,
  variables: Json<Map<String, Value>>,
  metadata: Json<Map<String, Value>>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl WorkflowRow {
  fn into_workflow(
    self,
    nodes: Vec<WorkflowNode>,
    edges: Vec<WorkflowEdge>,
  ) -> Result<Workflow, Error> {
    let status = WorkflowStatus::from_str(&self.status)
      .map_err(|e| Error::Database(sqlx::Error::Decode(e.into())))?;

    Ok(Workflow {
      id: self.id,
      user_id: self.user_id,
      agent_id: self.agent_id,
      name: self.name,
      description: self.description,
      status,
      variables: self.variables.0,
      metadata: self.metadata.0,
      nodes,
      edges,
      created_at: self.created_at,
      updated_at: self.updated_at,
    })
  }
}

#[derive(Debug, FromRow)]
struct NodeRow {
  id: String,
  node_key: String,
  #[sqlx(rename = "type")]
  node_type: String,
  position_x: f64,
  position_y: f64,
  data: Json<Map<String, Value>>,
  custom_node_id: Option<String>,
}

impl NodeRow {
  fn into_node(self) -> WorkflowNode {
    WorkflowNode {
      id: self.id,
      node_key: self.node_key,
      node_type: self.node_type,
      position_x: self.position_x,
      position_y: self.position_y,
      data: self.data.0,
      custom_node_id: self.custom_node_id,
    }
  }
}

#[derive(Debug, FromRow)]
struct EdgeRow {
  id: String,
  source: String,
  target: String,
  source_handle: Option<String>,
  target_handle: Option<String>,
  condition: Option<String>,
}

impl EdgeRow {
  fn into_edge(self) -> WorkflowEdge {
    WorkflowEdge {
      id: self.id,
      source: self.source,
      target: self.target,
      source_handle: self.source_handle,
      target_handle: self.target_handle,
      condition: self.condition,
    }
  }
}
