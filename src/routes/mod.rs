mod gmail;
mod runs;
mod webhooks;
mod workflows;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::state::AppState;

/// The full API surface under `/api`.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/api/health", get(health))
    .route("/api/workflows/{workflow_id}/run", post(workflows::run_workflow))
    .route("/api/webhook/{workflow_id}", post(webhooks::trigger_webhook))
    .route("/api/runs", get(runs::list_runs))
    .route("/api/runs/{run_id}", get(runs::get_run))
    .route("/api/gmail/setup", post(gmail::setup_integration))
    .route("/api/gmail/{integration_id}/test", post(gmail::test_integration))
    .route("/api/gmail/{integration_id}/poll-now", post(gmail::poll_now))
    .route("/api/gmail/oauth-instructions", get(gmail::oauth_instructions))
    .with_state(state)
}

async fn health() -> Json<Value> {
  Json(json!({ "status": "ok", "service": "agentkit" }))
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use agentkit_credentials::CredentialSealer;
  use agentkit_executor::WorkflowExecutor;
  use agentkit_gmail::GmailPoller;
  use agentkit_node::{HandlerConfig, HandlerRegistry};
  use agentkit_store::{SqliteStore, Store};
  use agentkit_workflow::{Workflow, WorkflowEdge, WorkflowNode, WorkflowStatus};
  use axum::Router;
  use axum::body::Body;
  use axum::http::{Request, StatusCode};
  use chrono::Utc;
  use http_body_util::BodyExt;
  use serde_json::{Value, json};
  use tower::ServiceExt;
  use uuid::Uuid;

  use super::*;

  async fn test_app() -> (Router, Arc<SqliteStore>, String) {
    let store = Arc::new(
      SqliteStore::connect("sqlite::memory:")
        .await
        .expect("in-memory store"),
    );
    store.migrate().await.expect("migrations");
    let user_id = store.ensure_user("dev@agentkit.local").await.unwrap();

    let dyn_store: Arc<dyn Store> = store.clone();
    let sealer = Arc::new(CredentialSealer::new("test-key"));
    let registry = Arc::new(HandlerRegistry::builtin(HandlerConfig::default()));
    let executor = Arc::new(WorkflowExecutor::new(dyn_store.clone(), registry));
    let poller = Arc::new(GmailPoller::new(
      dyn_store.clone(),
      executor.clone(),
      sealer.clone(),
    ));

    let app = router(AppState {
      store: dyn_store,
      executor,
      poller,
      sealer,
      user_id: user_id.clone(),
    });
    (app, store, user_id)
  }

  fn simple_workflow(user_id: &str, status: WorkflowStatus) -> Workflow {
    let now = Utc::now();
    let trigger = WorkflowNode {
      id: Uuid::new_v4().to_string(),
      node_key: "A".to_string(),
      node_type: "email_trigger".to_string(),
      position_x: 0.0,
      position_y: 0.0,
      data: serde_json::Map::new(),
      custom_node_id: None,
    };
    let response = WorkflowNode {
      id: Uuid::new_v4().to_string(),
      node_key: "R".to_string(),
      node_type: "response".to_string(),
      position_x: 0.0,
      position_y: 0.0,
      data: serde_json::Map::new(),
      custom_node_id: None,
    };
    let edge = WorkflowEdge {
      id: Uuid::new_v4().to_string(),
      source: "A".to_string(),
      target: "R".to_string(),
      source_handle: None,
      target_handle: None,
      condition: None,
    };

    Workflow {
      id: Uuid::new_v4().to_string(),
      user_id: user_id.to_string(),
      agent_id: None,
      name: "wf".to_string(),
      description: String::new(),
      status,
      variables: serde_json::Map::new(),
      metadata: serde_json::Map::new(),
      nodes: vec![trigger, response],
      edges: vec![edge],
      created_at: now,
      updated_at: now,
    }
  }

  async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn health_reports_service_name() {
    let (app, _store, _user) = test_app().await;

    let response = app
      .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
      body_json(response).await,
      json!({ "status": "ok", "service": "agentkit" })
    );
  }

  #[tokio::test]
  async fn webhook_rejects_unpublished_workflows() {
    let (app, store, user) = test_app().await;
    let wf = simple_workflow(&user, WorkflowStatus::Draft);
    store.create_workflow(&wf).await.unwrap();

    let response = app
      .oneshot(
        Request::post(format!("/api/webhook/{}", wf.id))
          .header("content-type", "application/json")
          .body(Body::from("{}"))
          .unwrap(),
      )
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn webhook_with_invalid_json_runs_with_empty_payload() {
    let (app, store, user) = test_app().await;
    let wf = simple_workflow(&user, WorkflowStatus::Published);
    store.create_workflow(&wf).await.unwrap();

    let response = app
      .oneshot(
        Request::post(format!("/api/webhook/{}", wf.id))
          .body(Body::from("definitely not json"))
          .unwrap(),
      )
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let run = body_json(response).await;
    assert_eq!(run["status"], json!("completed"));
    assert_eq!(run["input_payload"], json!({}));
    assert_eq!(run["trigger_type"], json!("webhook"));
    assert_eq!(run["node_runs"].as_array().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn manual_run_and_run_history_roundtrip() {
    let (app, store, user) = test_app().await;
    let wf = simple_workflow(&user, WorkflowStatus::Draft);
    store.create_workflow(&wf).await.unwrap();

    let response = app
      .clone()
      .oneshot(
        Request::post(format!("/api/workflows/{}/run", wf.id))
          .header("content-type", "application/json")
          .body(Body::from(r#"{"subject":"Hi"}"#))
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let run = body_json(response).await;
    assert_eq!(run["status"], json!("completed"));
    assert_eq!(run["trigger_type"], json!("manual"));
    let run_id = run["id"].as_str().unwrap().to_string();

    let response = app
      .clone()
      .oneshot(
        Request::get(format!("/api/runs/{}", run_id))
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["id"], json!(run_id));
    assert_eq!(fetched["node_runs"].as_array().unwrap().len(), 2);

    let response = app
      .oneshot(
        Request::get(format!("/api/runs?workflow_id={}&limit=10", wf.id))
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn unknown_run_is_a_404() {
    let (app, _store, _user) = test_app().await;

    let response = app
      .oneshot(
        Request::get(format!("/api/runs/{}", Uuid::new_v4()))
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn oauth_instructions_are_served() {
    let (app, _store, _user) = test_app().await;

    let response = app
      .oneshot(
        Request::get("/api/gmail/oauth-instructions")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["instructions"].is_array());
    assert_eq!(
      body["required_scopes"],
      json!(["https://www.googleapis.com/auth/gmail.readonly"])
    );
  }
}
