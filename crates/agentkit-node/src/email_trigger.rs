use agentkit_store::Store;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::{HandlerError, HandlerOutcome, NodeHandler};

/// Ingests the trigger payload into the email fields downstream nodes
/// reference.
///
/// Accepts payloads from a webhook, a manual run, or the Gmail poller. The
/// poller wraps its payload as `{trigger_type, body: {...}, integration_id}`
/// and the executor stores the whole envelope under `trigger.body`, so one
/// level of unwrapping happens here. Missing fields fall back to the
/// node's `test_*` data, then to fixed placeholders.
#[derive(Debug)]
pub struct EmailTriggerHandler;

#[async_trait]
impl NodeHandler for EmailTriggerHandler {
  async fn execute(
    &self,
    data: &Map<String, Value>,
    context: &Map<String, Value>,
    _store: &dyn Store,
  ) -> Result<HandlerOutcome, HandlerError> {
    let trigger_body = context
      .get("trigger")
      .and_then(Value::as_object)
      .and_then(|trigger| trigger.get("body"))
      .and_then(Value::as_object)
      .cloned()
      .unwrap_or_default();

    // Poller envelope: unwrap one level so `subject`/`body`/... are at the
    // top.
    let email = match trigger_body.get("body") {
      Some(Value::Object(inner)) => inner.clone(),
      _ => trigger_body,
    };

    let subject = field_or_test(&email, "subject", data, "test_subject", "(No Subject)");
    let body = field_or_test(&email, "body", data, "test_body", "(No Body)");
    let sender = field_or_test(&email, "sender", data, "test_sender", "unknown@example.com");

    let attachments = match email.get("attachments") {
      Some(Value::Array(items)) => Value::Array(items.clone()),
      _ => json!([]),
    };

    let received_at = email
      .get("received_at")
      .filter(|v| !v.is_null())
      .cloned()
      .unwrap_or_else(|| json!(""));

    let Value::Object(output) = json!({
      "subject": subject,
      "body": body,
      "sender": sender,
      "attachments": attachments,
      "received_at": received_at,
      "raw": Value::Object(email),
    }) else {
      unreachable!()
    };

    Ok(HandlerOutcome::output(output))
  }
}

/// Trigger field if present and non-empty, else the node's `test_*` value,
/// else the placeholder.
fn field_or_test(
  email: &Map<String, Value>,
  key: &str,
  data: &Map<String, Value>,
  test_key: &str,
  placeholder: &str,
) -> Value {
  match email.get(key) {
    Some(Value::String(s)) if !s.is_empty() => return Value::String(s.clone()),
    Some(value) if !value.is_null() && !value.is_string() => return value.clone(),
    _ => {}
  }
  data
    .get(test_key)
    .filter(|v| !v.is_null())
    .cloned()
    .unwrap_or_else(|| Value::String(placeholder.to_string()))
}
