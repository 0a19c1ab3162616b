//! Poller scenarios against a mocked Gmail API and an in-memory store.

use std::sync::Arc;

use agentkit_credentials::CredentialSealer;
use agentkit_executor::WorkflowExecutor;
use agentkit_gmail::GmailPoller;
use agentkit_node::{HandlerConfig, HandlerRegistry};
use agentkit_store::{Integration, RunStatus, SqliteStore, Store, TriggerKind};
use agentkit_workflow::{Workflow, WorkflowEdge, WorkflowNode, WorkflowStatus};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches a query parameter by prefix; the poller's window query embeds a
/// timestamp we cannot predict.
struct QueryStartsWith {
  key: &'static str,
  prefix: &'static str,
}

impl Match for QueryStartsWith {
  fn matches(&self, request: &Request) -> bool {
    request
      .url
      .query_pairs()
      .any(|(k, v)| k == self.key && v.starts_with(self.prefix))
  }
}

struct Harness {
  store: Arc<SqliteStore>,
  sealer: Arc<CredentialSealer>,
  user_id: String,
  integration: Integration,
  server: MockServer,
}

impl Harness {
  fn poller(&self) -> Arc<GmailPoller> {
    let store: Arc<dyn Store> = self.store.clone();
    let registry = Arc::new(HandlerRegistry::builtin(HandlerConfig::default()));
    let executor = Arc::new(WorkflowExecutor::new(store.clone(), registry));
    Arc::new(
      GmailPoller::new(store, executor, self.sealer.clone()).with_base_url(&self.server.uri()),
    )
  }
}

async fn harness(credentials: Value) -> Harness {
  let server = MockServer::start().await;

  let store = Arc::new(
    SqliteStore::connect("sqlite::memory:")
      .await
      .expect("in-memory store"),
  );
  store.migrate().await.expect("migrations");
  let user_id = store.ensure_user("dev@example.com").await.unwrap();

  let sealer = Arc::new(CredentialSealer::new("test-key"));
  let Value::Object(credential_map) = credentials else {
    panic!("credentials must be an object");
  };
  let sealed = sealer.seal(&credential_map).unwrap();

  let integration = Integration::new(&user_id, "Test Gmail", "gmail", sealed);
  store.create_integration(&integration).await.unwrap();

  Harness {
    store,
    sealer,
    user_id,
    integration,
    server,
  }
}

fn plain_credentials() -> Value {
  json!({
    "access_token": "tok-original",
    "refresh_token": "ref-1",
    "client_id": "cid",
    "client_secret": "sec",
  })
}

fn bound_workflow(user_id: &str, integration_id: &str) -> Workflow {
  let now = Utc::now();
  let trigger = WorkflowNode {
    id: Uuid::new_v4().to_string(),
    node_key: "A".to_string(),
    node_type: "email_trigger".to_string(),
    position_x: 0.0,
    position_y: 0.0,
    data: match json!({ "trigger_config": { "integration_id": integration_id } }) {
      Value::Object(map) => map,
      _ => unreachable!(),
    },
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
    name: "gmail summary".to_string(),
    description: String::new(),
    status: WorkflowStatus::Published,
    variables: serde_json::Map::new(),
    metadata: serde_json::Map::new(),
    nodes: vec![trigger, response],
    edges: vec![edge],
    created_at: now,
    updated_at: now,
  }
}

fn message_detail(id: &str, subject: &str) -> Value {
  json!({
    "id": id,
    "threadId": format!("thread-{id}"),
    "labelIds": ["UNREAD", "INBOX"],
    "snippet": "snippet text",
    "internalDate": "1767225600000",
    "payload": {
      "mimeType": "multipart/mixed",
      "headers": [
        { "name": "Subject", "value": subject },
        { "name": "From", "value": "sender@example.com" },
        { "name": "To", "value": "me@example.com" },
        { "name": "Date", "value": "Thu, 1 Jan 2026 00:00:00 +0000" },
      ],
      "parts": [
        { "mimeType": "text/plain", "body": { "data": URL_SAFE.encode("Hello body") } },
        {
          "mimeType": "application/pdf",
          "filename": "report.pdf",
          "body": { "size": 123, "attachmentId": "att-1" },
        },
      ],
    },
  })
}

async fn mount_unread_batch(server: &MockServer, ids: &[&str]) {
  let refs: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
  Mock::given(method("GET"))
    .and(path("/gmail/v1/users/me/messages"))
    .and(query_param("q", "is:unread"))
    .and(query_param("maxResults", "10"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": refs })))
    .mount(server)
    .await;

  for id in ids {
    Mock::given(method("GET"))
      .and(path(format!("/gmail/v1/users/me/messages/{id}")))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(message_detail(id, &format!("Mail {id}"))),
      )
      .mount(server)
      .await;
  }
}

#[tokio::test]
async fn first_tick_fetches_unread_and_triggers_each_message() {
  let h = harness(plain_credentials()).await;
  mount_unread_batch(&h.server, &["m1", "m2"]).await;

  let workflow = bound_workflow(&h.user_id, &h.integration.id);
  h.store.create_workflow(&workflow).await.unwrap();

  let poller = h.poller();
  let before = Utc::now();
  let fetched = poller.poll_integration(&h.integration).await.unwrap();
  assert_eq!(fetched, 2);

  let checked = poller.last_checked(&h.integration.id).expect("watermark set");
  assert!(checked >= before && checked <= Utc::now());

  let runs = h.store.list_runs(&h.user_id, None, 50).await.unwrap();
  assert_eq!(runs.len(), 2);
  for run in &runs {
    assert_eq!(run.trigger_kind, TriggerKind::Gmail);
    assert_eq!(run.status, RunStatus::Completed);
  }
}

#[tokio::test]
async fn second_tick_uses_the_time_window_path() {
  let h = harness(plain_credentials()).await;
  mount_unread_batch(&h.server, &[]).await;

  // The window query must carry an `after:` timestamp and the larger
  // batch size.
  Mock::given(method("GET"))
    .and(path("/gmail/v1/users/me/messages"))
    .and(QueryStartsWith { key: "q", prefix: "after:" })
    .and(query_param("maxResults", "50"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [] })))
    .expect(1)
    .mount(&h.server)
    .await;

  let poller = h.poller();
  poller.poll_integration(&h.integration).await.unwrap();
  poller.poll_integration(&h.integration).await.unwrap();
}

#[tokio::test]
async fn restart_refetches_and_redelivers_at_least_once() {
  let h = harness(plain_credentials()).await;
  mount_unread_batch(&h.server, &["m1", "m2"]).await;

  let workflow = bound_workflow(&h.user_id, &h.integration.id);
  h.store.create_workflow(&workflow).await.unwrap();

  h.poller().poll_integration(&h.integration).await.unwrap();
  // A fresh poller models a process restart: the in-memory watermark is
  // gone, the same unread messages come back, and we execute again.
  h.poller().poll_integration(&h.integration).await.unwrap();

  let runs = h.store.list_runs(&h.user_id, None, 50).await.unwrap();
  assert_eq!(runs.len(), 4);
}

#[tokio::test]
async fn trigger_payload_carries_the_gmail_envelope() {
  let h = harness(plain_credentials()).await;
  mount_unread_batch(&h.server, &["m1"]).await;

  let workflow = bound_workflow(&h.user_id, &h.integration.id);
  h.store.create_workflow(&workflow).await.unwrap();

  h.poller().poll_integration(&h.integration).await.unwrap();

  let runs = h.store.list_runs(&h.user_id, None, 50).await.unwrap();
  let payload = &runs[0].input_payload.0;
  assert_eq!(payload["trigger_type"], json!("gmail"));
  assert_eq!(payload["integration_id"], json!(h.integration.id));
  assert_eq!(payload["body"]["message_id"], json!("m1"));
  assert_eq!(payload["body"]["thread_id"], json!("thread-m1"));
  assert_eq!(payload["body"]["subject"], json!("Mail m1"));
  assert_eq!(payload["body"]["sender"], json!("sender@example.com"));
  assert_eq!(payload["body"]["body"], json!("Hello body"));
  assert_eq!(payload["body"]["email_content"], json!("Hello body"));
  assert_eq!(payload["body"]["attachments"][0]["filename"], json!("report.pdf"));
  assert_eq!(payload["body"]["snippet"], json!("snippet text"));
  assert_eq!(payload["body"]["labels"], json!(["UNREAD", "INBOX"]));

  // The trigger node unwrapped the envelope one level.
  let trigger_output = &runs[0].node_runs[0].output_data.0;
  assert_eq!(trigger_output["subject"], json!("Mail m1"));
  assert_eq!(trigger_output["sender"], json!("sender@example.com"));
}

#[tokio::test]
async fn unbound_workflows_are_not_triggered() {
  let h = harness(plain_credentials()).await;
  mount_unread_batch(&h.server, &["m1"]).await;

  // Bound to some other integration id.
  let workflow = bound_workflow(&h.user_id, "some-other-integration");
  h.store.create_workflow(&workflow).await.unwrap();

  h.poller().poll_integration(&h.integration).await.unwrap();

  let runs = h.store.list_runs(&h.user_id, None, 50).await.unwrap();
  assert!(runs.is_empty());
}

#[tokio::test]
async fn expired_token_is_refreshed_and_resealed() {
  let h = harness(plain_credentials()).await;

  // Swap in expired credentials whose token endpoint is this test's mock
  // server.
  let Value::Object(expired) = json!({
    "access_token": "tok-original",
    "refresh_token": "ref-1",
    "client_id": "cid",
    "client_secret": "sec",
    "token_uri": format!("{}/token", h.server.uri()),
    "expiry": "2020-01-01T00:00:00Z",
  }) else {
    unreachable!()
  };
  let sealed = h.sealer.seal(&expired).unwrap();
  h.store
    .update_integration_credentials(&h.integration.id, &sealed)
    .await
    .unwrap();
  let integration = h.store.get_integration(&h.integration.id).await.unwrap();

  Mock::given(method("POST"))
    .and(path("/token"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "access_token": "tok-refreshed",
      "expires_in": 3600,
      "token_type": "Bearer",
    })))
    .expect(1)
    .mount(&h.server)
    .await;

  mount_unread_batch(&h.server, &[]).await;

  h.poller().poll_integration(&integration).await.unwrap();

  let rotated = h.store.get_integration(&h.integration.id).await.unwrap();
  let unsealed = h.sealer.unseal(&rotated.credentials_sealed).unwrap();
  assert_eq!(unsealed["access_token"], json!("tok-refreshed"));
  assert_eq!(unsealed["refresh_token"], json!("ref-1"));
}
