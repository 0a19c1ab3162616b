use std::sync::LazyLock;

use agentkit_store::Store;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::{HandlerError, HandlerOutcome, NodeHandler, stringify};

static HTML_TAG: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"<[^>]+>").expect("html tag pattern"));

static WHITESPACE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Normalises an email into a single text block for the LLM: strips
/// HTML-tag-like substrings from the body, decodes base64 attachment
/// content, and concatenates everything deterministically.
#[derive(Debug)]
pub struct ExtractContentHandler;

#[async_trait]
impl NodeHandler for ExtractContentHandler {
  async fn execute(
    &self,
    data: &Map<String, Value>,
    _context: &Map<String, Value>,
    _store: &dyn Store,
  ) -> Result<HandlerOutcome, HandlerError> {
    let subject = stringify(data.get("subject"));
    let body = stringify(data.get("body"));

    let stripped = HTML_TAG.replace_all(&body, " ");
    let clean_body = WHITESPACE.replace_all(&stripped, " ").trim().to_string();

    let attachments = data.get("attachments").and_then(Value::as_array);
    let attachment_count = attachments.map(Vec::len).unwrap_or(0);

    let mut attachment_texts: Vec<String> = Vec::new();
    for attachment in attachments.into_iter().flatten() {
      let Some(attachment) = attachment.as_object() else {
        continue;
      };
      let name = attachment
        .get("filename")
        .or_else(|| attachment.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("attachment");

      let content = attachment.get("content").and_then(Value::as_str).unwrap_or("");
      if content.is_empty() {
        attachment_texts.push(format!("[Attachment: {}]", name));
      } else {
        match decode_text(content) {
          Some(decoded) => attachment_texts.push(format!("[Attachment: {}]\n{}", name, decoded)),
          None => attachment_texts.push(format!("[Attachment: {}] (binary, not decoded)", name)),
        }
      }
    }

    let mut combined = format!("Subject: {}\n\nBody:\n{}", subject, clean_body);
    if !attachment_texts.is_empty() {
      combined.push_str("\n\nAttachments:\n");
      combined.push_str(&attachment_texts.join("\n\n"));
    }

    let Value::Object(output) = json!({
      "subject": subject,
      "clean_body": clean_body,
      "attachment_count": attachment_count,
      "attachment_texts": attachment_texts,
      "combined_text": combined,
    }) else {
      unreachable!()
    };

    Ok(HandlerOutcome::output(output))
  }
}

/// Base64-decode attachment content as UTF-8 text, dropping invalid byte
/// sequences. `None` when the content is not valid base64 at all.
fn decode_text(content: &str) -> Option<String> {
  let bytes = STANDARD.decode(content).ok()?;
  Some(String::from_utf8_lossy(&bytes).replace('\u{FFFD}', ""))
}
