use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RunStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Cancelled,
}

/// Status of a single node's execution within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NodeRunStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Skipped,
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TriggerKind {
  Manual,
  Webhook,
  Gmail,
}

impl TriggerKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      TriggerKind::Manual => "manual",
      TriggerKind::Webhook => "webhook",
      TriggerKind::Gmail => "gmail",
    }
  }
}

/// One execution of a workflow.
///
/// Created `running` when execution starts and updated to a terminal state
/// exactly once; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowRun {
  pub id: String,
  pub workflow_id: String,
  pub status: RunStatus,
  #[sqlx(rename = "trigger_type")]
  #[serde(rename = "trigger_type")]
  pub trigger_kind: TriggerKind,
  pub input_payload: Json<Value>,
  pub output_payload: Json<Value>,
  pub error: Option<String>,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,

  /// Node runs in execution order. Loaded by the store, not a column.
  #[sqlx(skip)]
  #[serde(default)]
  pub node_runs: Vec<NodeRun>,
}

impl WorkflowRun {
  /// A fresh run in the `running` state.
  pub fn started(workflow_id: &str, trigger_kind: TriggerKind, input_payload: Value) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      workflow_id: workflow_id.to_string(),
      status: RunStatus::Running,
      trigger_kind,
      input_payload: Json(input_payload),
      output_payload: Json(Value::Object(serde_json::Map::new())),
      error: None,
      started_at: Utc::now(),
      completed_at: None,
      node_runs: Vec::new(),
    }
  }
}

/// One node's slice of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct NodeRun {
  pub id: String,
  pub run_id: String,
  /// The node's persistent id.
  pub node_id: String,
  /// The node's author-assigned key, set once execution reaches the node.
  pub node_key: Option<String>,
  pub status: NodeRunStatus,
  pub input_data: Json<Value>,
  pub output_data: Json<Value>,
  pub error: Option<String>,
  pub execution_time_ms: f64,
  pub token_usage: Option<Json<Value>>,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl NodeRun {
  /// A fresh node run in the `running` state.
  pub fn started(run_id: &str, node_id: &str) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      run_id: run_id.to_string(),
      node_id: node_id.to_string(),
      node_key: None,
      status: NodeRunStatus::Running,
      input_data: Json(Value::Object(serde_json::Map::new())),
      output_data: Json(Value::Object(serde_json::Map::new())),
      error: None,
      execution_time_ms: 0.0,
      token_usage: None,
      started_at: Utc::now(),
      completed_at: None,
    }
  }
}

/// An external credential bundle (e.g. a connected Gmail account).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Integration {
  pub id: String,
  pub user_id: String,
  pub name: String,
  #[sqlx(rename = "type")]
  #[serde(rename = "type")]
  pub kind: String,
  /// Opaque sealed credential blob; never serialized to API consumers.
  #[serde(skip_serializing, default)]
  pub credentials_sealed: String,
  pub status: String,
  pub metadata: Json<Value>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Integration {
  pub fn new(user_id: &str, name: &str, kind: &str, credentials_sealed: String) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4().to_string(),
      user_id: user_id.to_string(),
      name: name.to_string(),
      kind: kind.to_string(),
      credentials_sealed,
      status: "active".to_string(),
      metadata: Json(Value::Object(serde_json::Map::new())),
      created_at: now,
      updated_at: now,
    }
  }
}
