use serde::{Deserialize, Serialize};

/// A directed link between two node keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
  pub id: String,

  /// Source node key.
  pub source: String,

  /// Target node key.
  pub target: String,

  /// Optional port labels assigned by the editor.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_handle: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_handle: Option<String>,

  /// Reserved. Persisted for forward compatibility, never evaluated.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<String>,
}
