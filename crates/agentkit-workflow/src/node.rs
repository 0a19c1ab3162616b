use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
  /// Opaque persistent id (UUID string).
  pub id: String,

  /// Author-assigned key, stable across edits. Edges and expressions refer
  /// to nodes by this key, not by `id`.
  #[serde(default)]
  pub node_key: String,

  /// Type discriminator; must resolve to a registered handler at execution
  /// time.
  #[serde(rename = "type")]
  pub node_type: String,

  /// Editor canvas position. Persisted for the frontend, ignored by the
  /// engine.
  #[serde(default)]
  pub position_x: f64,
  #[serde(default)]
  pub position_y: f64,

  /// Author-provided static data; values may contain `{{...}}` expressions.
  #[serde(default)]
  pub data: Map<String, Value>,

  /// Optional reference to a custom-node template.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub custom_node_id: Option<String>,
}

impl WorkflowNode {
  /// The key this node is addressed by in edges, expressions, and the run
  /// context: the author-assigned key, falling back to the persistent id.
  pub fn key(&self) -> &str {
    if self.node_key.is_empty() {
      &self.id
    } else {
      &self.node_key
    }
  }
}
