use agentkit_store::{TriggerKind, WorkflowRun};
use agentkit_workflow::WorkflowStatus;
use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

/// `POST /api/webhook/{workflow_id}`: trigger a published workflow.
///
/// The body may be any shape; a body that fails to parse as JSON runs the
/// workflow with an empty payload rather than failing the request.
pub async fn trigger_webhook(
  State(state): State<AppState>,
  Path(workflow_id): Path<String>,
  body: String,
) -> Result<Json<WorkflowRun>, ApiError> {
  let workflow = state
    .store
    .get_workflow(&workflow_id)
    .await
    .map_err(|_| ApiError::NotFound("Workflow not found or not published".to_string()))?;

  if workflow.status != WorkflowStatus::Published {
    return Err(ApiError::NotFound(
      "Workflow not found or not published".to_string(),
    ));
  }

  let payload: Value = serde_json::from_str(&body).unwrap_or_else(|_| json!({}));

  let run = state
    .executor
    .execute(&workflow, payload, TriggerKind::Webhook)
    .await?;
  Ok(Json(run))
}
