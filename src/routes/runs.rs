use agentkit_store::WorkflowRun;
use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
  workflow_id: Option<String>,
  limit: Option<i64>,
}

/// `GET /api/runs`: run history, newest first, node runs included.
pub async fn list_runs(
  State(state): State<AppState>,
  Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<WorkflowRun>>, ApiError> {
  let runs = state
    .store
    .list_runs(
      &state.user_id,
      query.workflow_id.as_deref(),
      query.limit.unwrap_or(50),
    )
    .await?;
  Ok(Json(runs))
}

/// `GET /api/runs/{run_id}`: one run with its node runs.
pub async fn get_run(
  State(state): State<AppState>,
  Path(run_id): Path<String>,
) -> Result<Json<WorkflowRun>, ApiError> {
  let run = state.store.get_run(&run_id).await?;
  Ok(Json(run))
}
