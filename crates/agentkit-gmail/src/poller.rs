use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentkit_credentials::CredentialSealer;
use agentkit_executor::WorkflowExecutor;
use agentkit_store::{Integration, Store, TriggerKind};
use agentkit_workflow::{Workflow, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::{EmailMessage, GmailClient, GmailCredentials};
use crate::GmailError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Message budget per poll: a catch-up window fetch may pull more than a
/// first-run unread fetch.
const FIRST_POLL_LIMIT: u32 = 10;
const WINDOW_POLL_LIMIT: u32 = 50;

/// Background poller for Gmail integrations.
///
/// One process-wide instance owns all active Gmail integrations: each tick
/// it fetches new mail per integration, matches messages to published
/// workflows with an `email_trigger` node bound to that integration, and
/// dispatches executions. Failures are contained per integration: one
/// broken account never stops its siblings or the loop.
pub struct GmailPoller {
  store: Arc<dyn Store>,
  executor: Arc<WorkflowExecutor>,
  sealer: Arc<CredentialSealer>,
  base_url: String,
  poll_interval: Duration,
  /// Per-integration fetch watermark. In-memory only: a restart falls back
  /// to the unread fetch and may re-deliver recent mail.
  last_check: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl GmailPoller {
  pub fn new(
    store: Arc<dyn Store>,
    executor: Arc<WorkflowExecutor>,
    sealer: Arc<CredentialSealer>,
  ) -> Self {
    Self {
      store,
      executor,
      sealer,
      base_url: GmailClient::DEFAULT_BASE_URL.to_string(),
      poll_interval: DEFAULT_POLL_INTERVAL,
      last_check: Mutex::new(HashMap::new()),
    }
  }

  /// Point the client at a different Gmail endpoint (tests).
  pub fn with_base_url(mut self, base_url: &str) -> Self {
    self.base_url = base_url.trim_end_matches('/').to_string();
    self
  }

  pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
    self.poll_interval = poll_interval;
    self
  }

  /// When this integration was last polled, if it has been this process
  /// lifetime.
  pub fn last_checked(&self, integration_id: &str) -> Option<DateTime<Utc>> {
    self
      .last_check
      .lock()
      .expect("last_check mutex")
      .get(integration_id)
      .copied()
  }

  /// Run the polling loop until the token is cancelled.
  ///
  /// An in-flight tick completes before cancellation is observed; the
  /// interval sleep is the only cancellation point.
  pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
    info!(interval_secs = self.poll_interval.as_secs(), "gmail poller started");

    loop {
      self.poll_all().await;

      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = tokio::time::sleep(self.poll_interval) => {}
      }
    }

    info!("gmail poller stopped");
  }

  /// Poll every active Gmail integration once, best effort.
  pub async fn poll_all(&self) {
    let integrations = match self.store.list_integrations("gmail", "active").await {
      Ok(integrations) => integrations,
      Err(e) => {
        error!(error = %e, "failed to list gmail integrations");
        return;
      }
    };

    for integration in &integrations {
      if let Err(e) = self.poll_integration(integration).await {
        error!(integration_id = %integration.id, error = %e, "gmail poll failed");
      }
    }
  }

  /// Poll one integration: fetch new messages and dispatch matching
  /// workflows. Returns how many messages were fetched.
  pub async fn poll_integration(&self, integration: &Integration) -> Result<usize, GmailError> {
    let credentials =
      GmailCredentials::from_map(self.sealer.unseal(&integration.credentials_sealed)?)?;
    let original_token = credentials.access_token.clone();

    let client = GmailClient::connect(credentials, &self.base_url).await?;

    let since = self.last_checked(&integration.id);
    let messages = match since {
      Some(since) => client.messages_since(since, WINDOW_POLL_LIMIT).await?,
      None => client.unread_messages(FIRST_POLL_LIMIT).await?,
    };

    // Advance the watermark before processing so a failing workflow does
    // not make the next tick re-fetch the same window.
    self
      .last_check
      .lock()
      .expect("last_check mutex")
      .insert(integration.id.clone(), Utc::now());

    if !messages.is_empty() {
      info!(
        integration_id = %integration.id,
        count = messages.len(),
        "gmail poll found new messages"
      );
      self.trigger_workflows(integration, &messages).await?;
    }

    if client.credentials().access_token != original_token {
      let sealed = self.sealer.seal(&client.credentials().to_map())?;
      self
        .store
        .update_integration_credentials(&integration.id, &sealed)
        .await?;
      info!(integration_id = %integration.id, "rotated gmail credentials after refresh");
    }

    Ok(messages.len())
  }

  /// Dispatch each message to every published workflow bound to this
  /// integration. Executions are sequential within a tick; a failing run
  /// does not stop the rest.
  async fn trigger_workflows(
    &self,
    integration: &Integration,
    messages: &[EmailMessage],
  ) -> Result<(), GmailError> {
    let workflows = self
      .store
      .list_workflows(&integration.user_id, Some(WorkflowStatus::Published))
      .await?;

    let matching: Vec<&Workflow> = workflows
      .iter()
      .filter(|workflow| listens_to(workflow, &integration.id))
      .collect();

    if matching.is_empty() {
      debug!(integration_id = %integration.id, "no workflows bound to integration");
      return Ok(());
    }

    for message in messages {
      for workflow in &matching {
        let payload = trigger_payload(integration, message);
        match self
          .executor
          .execute(workflow, payload, TriggerKind::Gmail)
          .await
        {
          Ok(run) => info!(
            workflow_id = %workflow.id,
            run_id = %run.id,
            subject = %message.subject,
            "triggered workflow for email"
          ),
          Err(e) => error!(
            workflow_id = %workflow.id,
            error = %e,
            "failed to execute workflow for email"
          ),
        }
      }
    }

    Ok(())
  }
}

/// Does this workflow have an `email_trigger` node bound to the
/// integration? First match suffices.
fn listens_to(workflow: &Workflow, integration_id: &str) -> bool {
  workflow.nodes.iter().any(|node| {
    node.node_type == "email_trigger"
      && node
        .data
        .get("trigger_config")
        .and_then(Value::as_object)
        .and_then(|config| config.get("integration_id"))
        .and_then(Value::as_str)
        == Some(integration_id)
  })
}

/// The envelope the executor stores under `trigger.body`; the
/// `email_trigger` handler unwraps the inner `body` one level.
fn trigger_payload(integration: &Integration, message: &EmailMessage) -> Value {
  json!({
    "trigger_type": "gmail",
    "integration_id": integration.id,
    "body": {
      "message_id": message.message_id,
      "thread_id": message.thread_id,
      "subject": message.subject,
      "sender": message.sender,
      "to": message.to,
      "body": message.body,
      "email_content": message.body,
      "attachments": message.attachments,
      "received_at": message.received_at,
      "snippet": message.snippet,
      "labels": message.labels,
    }
  })
}
