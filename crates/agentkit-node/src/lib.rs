//! Node handlers for agentkit workflows.
//!
//! Every node type maps to a [`NodeHandler`] strategy through the
//! [`HandlerRegistry`]. A handler receives the node's data with expressions
//! already resolved, a read-only view of the run context, and the
//! persistence facade as a side channel (most handlers never touch it). It
//! returns its output map plus optional token accounting; the executor
//! merges outputs into the context.
//!
//! Builtins cover the email → summarize → sheets flow: trigger ingestion,
//! content extraction, LLM summarization, spreadsheet append, and a
//! passthrough response node.

mod email_trigger;
mod extract_content;
mod google_sheets;
mod response;
mod summarize;

pub use email_trigger::EmailTriggerHandler;
pub use extract_content::ExtractContentHandler;
pub use google_sheets::GoogleSheetsHandler;
pub use response::ResponseHandler;
pub use summarize::SummarizeHandler;

use std::collections::HashMap;
use std::sync::Arc;

use agentkit_store::Store;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors a handler can fail with. The executor records the message on the
/// node run; it never crosses the run boundary as a panic.
#[derive(Debug, Error)]
pub enum HandlerError {
  /// Required static configuration is missing or malformed.
  #[error("invalid node configuration: {0}")]
  Config(String),

  /// An external API returned a non-success or malformed response, or the
  /// request itself failed (timeouts included).
  #[error("{service} request failed: {detail}")]
  Upstream { service: &'static str, detail: String },

  /// No handler is registered for the node's type discriminator.
  #[error("unknown node type: '{node_type}' (supported: {supported})")]
  UnknownNodeType { node_type: String, supported: String },
}

impl HandlerError {
  pub(crate) fn upstream(service: &'static str, detail: impl Into<String>) -> Self {
    HandlerError::Upstream {
      service,
      detail: detail.into(),
    }
  }
}

/// Token accounting reported by LLM-backed handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
  pub prompt_tokens: u64,
  pub completion_tokens: u64,
  pub total_tokens: u64,
}

/// What a handler hands back to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutcome {
  /// Output map; exposed to downstream expressions as `{node_key}.output`.
  pub output: Map<String, Value>,
  /// Set only by handlers that consumed LLM tokens.
  pub token_usage: Option<TokenUsage>,
}

impl HandlerOutcome {
  pub fn output(output: Map<String, Value>) -> Self {
    Self {
      output,
      token_usage: None,
    }
  }
}

/// Strategy implementing one node type's behavior.
///
/// Handlers are stateless or hold only immutable configuration, so one
/// shared instance serves every concurrent run. They must not mutate the
/// context.
#[async_trait]
pub trait NodeHandler: Send + Sync + std::fmt::Debug {
  async fn execute(
    &self,
    data: &Map<String, Value>,
    context: &Map<String, Value>,
    store: &dyn Store,
  ) -> Result<HandlerOutcome, HandlerError>;
}

/// Immutable configuration shared by the builtin handlers.
///
/// The base URLs exist so tests can point handlers at a local mock server;
/// production uses the defaults.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
  /// Fallback API key used when a summarize node omits its own.
  pub openai_api_key: Option<String>,
  pub openai_base_url: String,
  pub sheets_base_url: String,
  pub google_token_url: String,
}

impl Default for HandlerConfig {
  fn default() -> Self {
    Self {
      openai_api_key: None,
      openai_base_url: "https://api.openai.com".to_string(),
      sheets_base_url: "https://sheets.googleapis.com".to_string(),
      google_token_url: "https://oauth2.googleapis.com/token".to_string(),
    }
  }
}

/// Maps a node's `type` discriminator to its handler.
///
/// Built once at startup and shared immutably across every run.
pub struct HandlerRegistry {
  handlers: HashMap<&'static str, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
  /// Build a registry with all builtin handlers.
  pub fn builtin(config: HandlerConfig) -> Self {
    let mut handlers: HashMap<&'static str, Arc<dyn NodeHandler>> = HashMap::new();
    handlers.insert("email_trigger", Arc::new(EmailTriggerHandler));
    handlers.insert("extract_content", Arc::new(ExtractContentHandler));
    handlers.insert("summarize", Arc::new(SummarizeHandler::new(&config)));
    handlers.insert("google_sheets", Arc::new(GoogleSheetsHandler::new(&config)));
    handlers.insert("response", Arc::new(ResponseHandler));
    Self { handlers }
  }

  /// Resolve a handler by node type.
  pub fn handler_for(&self, node_type: &str) -> Result<Arc<dyn NodeHandler>, HandlerError> {
    self.handlers.get(node_type).cloned().ok_or_else(|| {
      let mut supported: Vec<&str> = self.handlers.keys().copied().collect();
      supported.sort_unstable();
      HandlerError::UnknownNodeType {
        node_type: node_type.to_string(),
        supported: supported.join(", "),
      }
    })
  }
}

/// A non-empty string field, trimmed. Null, absent, non-string, and empty
/// values are all treated as missing; node data routinely carries empty
/// strings for fields the editor rendered but the user left blank.
pub(crate) fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
  match map.get(key) {
    Some(Value::String(s)) => {
      let trimmed = s.trim();
      if trimmed.is_empty() { None } else { Some(trimmed) }
    }
    _ => None,
  }
}

/// String form of a field: strings verbatim, scalars and structures in
/// their JSON rendering, null/absent as empty.
pub(crate) fn stringify(value: Option<&Value>) -> String {
  match value {
    None | Some(Value::Null) => String::new(),
    Some(Value::String(s)) => s.clone(),
    Some(other) => other.to_string(),
  }
}

#[cfg(test)]
pub(crate) mod test_support {
  use agentkit_store::SqliteStore;
  use serde_json::{Map, Value};

  /// Handlers take the store as a side channel; none of the builtins
  /// touch it, so tests hand them an empty in-memory database.
  pub async fn empty_store() -> SqliteStore {
    SqliteStore::connect("sqlite::memory:")
      .await
      .expect("in-memory store")
  }

  pub fn object(value: Value) -> Map<String, Value> {
    match value {
      Value::Object(map) => map,
      other => panic!("expected a JSON object, got {}", other),
    }
  }
}
