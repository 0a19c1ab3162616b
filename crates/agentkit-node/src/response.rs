use agentkit_store::Store;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::{HandlerError, HandlerOutcome, NodeHandler};

/// Final output node: wraps the resolved `body` as the workflow result.
#[derive(Debug)]
pub struct ResponseHandler;

#[async_trait]
impl NodeHandler for ResponseHandler {
  async fn execute(
    &self,
    data: &Map<String, Value>,
    _context: &Map<String, Value>,
    _store: &dyn Store,
  ) -> Result<HandlerOutcome, HandlerError> {
    let body = data.get("body").cloned().unwrap_or(json!({}));

    let Value::Object(output) = json!({
      "type": "json",
      "data": body,
    }) else {
      unreachable!()
    };

    Ok(HandlerOutcome::output(output))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::test_support::{empty_store, object};

  #[tokio::test]
  async fn wraps_body_as_json_result() {
    let store = empty_store().await;
    let data = object(json!({ "body": { "who": "bob@x" } }));

    let outcome = ResponseHandler.execute(&data, &Map::new(), &store).await.unwrap();
    assert_eq!(outcome.output["type"], json!("json"));
    assert_eq!(outcome.output["data"], json!({ "who": "bob@x" }));
  }

  #[tokio::test]
  async fn missing_body_becomes_empty_object() {
    let store = empty_store().await;

    let outcome = ResponseHandler
      .execute(&Map::new(), &Map::new(), &store)
      .await
      .unwrap();
    assert_eq!(outcome.output["data"], json!({}));
  }
}
