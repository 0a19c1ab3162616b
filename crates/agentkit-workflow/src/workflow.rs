use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::edge::WorkflowEdge;
use crate::graph::Graph;
use crate::node::WorkflowNode;

/// Publication status of a workflow.
///
/// Only `published` workflows are triggerable via webhook or event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
  Draft,
  Published,
}

impl WorkflowStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      WorkflowStatus::Draft => "draft",
      WorkflowStatus::Published => "published",
    }
  }
}

impl std::str::FromStr for WorkflowStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "draft" => Ok(WorkflowStatus::Draft),
      "published" => Ok(WorkflowStatus::Published),
      other => Err(format!("unknown workflow status: '{}'", other)),
    }
  }
}

/// A workflow: a persistent directed graph of typed nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  /// UUID string.
  pub id: String,

  /// Owning user (UUID string).
  pub user_id: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub agent_id: Option<String>,

  pub name: String,

  #[serde(default)]
  pub description: String,

  pub status: WorkflowStatus,

  /// Free-form variables exposed to expressions as `workflow.variables.*`.
  #[serde(default)]
  pub variables: Map<String, Value>,

  #[serde(default)]
  pub metadata: Map<String, Value>,

  /// Node insertion order is preserved: it is the tie-break order for
  /// topological scheduling.
  #[serde(default)]
  pub nodes: Vec<WorkflowNode>,

  #[serde(default)]
  pub edges: Vec<WorkflowEdge>,

  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Workflow {
  /// Build the graph structure over author-assigned node keys.
  pub fn graph(&self) -> Graph {
    Graph::new(
      self.nodes.iter().map(|n| n.key().to_string()).collect(),
      self
        .edges
        .iter()
        .map(|e| (e.source.clone(), e.target.clone()))
        .collect(),
    )
  }

  /// Look up a node by its author-assigned key (or id fallback).
  pub fn node_by_key(&self, key: &str) -> Option<&WorkflowNode> {
    self.nodes.iter().find(|n| n.key() == key)
  }
}
