use agentkit_store::{TriggerKind, WorkflowRun};
use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

/// `POST /api/workflows/{workflow_id}/run`: run a workflow manually.
///
/// Works on drafts too; publication only gates the webhook and event-source
/// paths.
pub async fn run_workflow(
  State(state): State<AppState>,
  Path(workflow_id): Path<String>,
  payload: Option<Json<Value>>,
) -> Result<Json<WorkflowRun>, ApiError> {
  let workflow = state.store.get_workflow(&workflow_id).await?;

  let payload = payload.map(|Json(value)| value).unwrap_or_else(|| json!({}));

  let run = state
    .executor
    .execute(&workflow, payload, TriggerKind::Manual)
    .await?;
  Ok(Json(run))
}
