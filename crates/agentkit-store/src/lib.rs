//! Persistence facade for agentkit.
//!
//! The [`Store`] trait is the only surface the execution engine, the event
//! poller, and the HTTP layer use to touch the database. Run and node-run
//! records are written incrementally (insert on start, update on
//! completion) so concurrent readers observe progress while a run is in
//! flight; a run record in a terminal state is the source of truth.

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use sqlx::types::Json;
pub use types::{Integration, NodeRun, NodeRunStatus, RunStatus, TriggerKind, WorkflowRun};

use agentkit_workflow::{Workflow, WorkflowStatus};
use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

/// Storage operations consumed by the engine, poller, and API layer.
#[async_trait]
pub trait Store: Send + Sync {
  /// Look up a user by email, creating it if absent. Returns the user id.
  ///
  /// Authentication is handled outside this service; this supplies the
  /// dev-mode default owner for API-created records.
  async fn ensure_user(&self, email: &str) -> Result<String, Error>;

  /// Persist a workflow together with its nodes and edges.
  async fn create_workflow(&self, workflow: &Workflow) -> Result<(), Error>;

  /// Load a workflow with its graph (nodes and edges) fully materialized.
  async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, Error>;

  /// List a user's workflows (graphs materialized), optionally filtered by
  /// status.
  async fn list_workflows(
    &self,
    user_id: &str,
    status: Option<WorkflowStatus>,
  ) -> Result<Vec<Workflow>, Error>;

  /// Create a new workflow run record.
  async fn create_run(&self, run: &WorkflowRun) -> Result<(), Error>;

  /// Update a run's status, payloads, error, and completion timestamp.
  async fn update_run(&self, run: &WorkflowRun) -> Result<(), Error>;

  /// Get a run by id, node runs included.
  async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, Error>;

  /// List runs for a user, newest first, node runs included.
  async fn list_runs(
    &self,
    user_id: &str,
    workflow_id: Option<&str>,
    limit: i64,
  ) -> Result<Vec<WorkflowRun>, Error>;

  /// Create a new node run record.
  async fn create_node_run(&self, node_run: &NodeRun) -> Result<(), Error>;

  /// Update a node run's terminal state.
  async fn update_node_run(&self, node_run: &NodeRun) -> Result<(), Error>;

  /// Persist a new integration.
  async fn create_integration(&self, integration: &Integration) -> Result<(), Error>;

  /// Get an integration by id.
  async fn get_integration(&self, integration_id: &str) -> Result<Integration, Error>;

  /// List integrations by kind and status.
  async fn list_integrations(&self, kind: &str, status: &str) -> Result<Vec<Integration>, Error>;

  /// Replace an integration's sealed credentials (token rotation).
  async fn update_integration_credentials(
    &self,
    integration_id: &str,
    sealed: &str,
  ) -> Result<(), Error>;
}
