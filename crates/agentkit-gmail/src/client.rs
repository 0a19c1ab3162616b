use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::GmailError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens may be used for a little while after their recorded expiry; the
/// skew refreshes slightly early instead of racing the deadline.
const EXPIRY_SKEW: chrono::Duration = chrono::Duration::seconds(60);

/// OAuth2 credential bundle for one Gmail account.
///
/// Stored sealed on the integration row; the poller re-seals and persists
/// it whenever a poll refreshed the access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmailCredentials {
  #[serde(default)]
  pub access_token: String,
  #[serde(default)]
  pub refresh_token: String,
  #[serde(default = "default_token_uri")]
  pub token_uri: String,
  #[serde(default)]
  pub client_id: String,
  #[serde(default)]
  pub client_secret: String,
  #[serde(default = "default_scopes")]
  pub scopes: Vec<String>,
  #[serde(default)]
  pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
  DEFAULT_TOKEN_URI.to_string()
}

fn default_scopes() -> Vec<String> {
  vec![DEFAULT_SCOPE.to_string()]
}

impl GmailCredentials {
  /// Parse from an unsealed credential map.
  pub fn from_map(map: Map<String, Value>) -> Result<Self, GmailError> {
    let credentials: GmailCredentials = serde_json::from_value(Value::Object(map))
      .map_err(|_| GmailError::MissingCredential("access_token"))?;
    if credentials.access_token.is_empty() {
      return Err(GmailError::MissingCredential("access_token"));
    }
    Ok(credentials)
  }

  /// Render back into a sealable map.
  pub fn to_map(&self) -> Map<String, Value> {
    match serde_json::to_value(self) {
      Ok(Value::Object(map)) => map,
      _ => Map::new(),
    }
  }

  fn expired(&self) -> bool {
    self
      .expiry
      .is_some_and(|expiry| expiry <= Utc::now() + EXPIRY_SKEW)
  }
}

/// One fetched email, normalized into the shape trigger payloads carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
  pub message_id: String,
  pub thread_id: String,
  pub subject: String,
  pub sender: String,
  pub to: String,
  pub body: String,
  pub attachments: Vec<EmailAttachment>,
  pub received_at: String,
  pub snippet: String,
  pub labels: Vec<String>,
}

/// Attachment metadata; content stays on the Gmail side, referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAttachment {
  pub filename: String,
  pub mime_type: String,
  pub size: u64,
  pub attachment_id: Option<String>,
}

/// Thin client over the Gmail REST API for one account.
///
/// `connect` refreshes an expired access token up front; the caller checks
/// [`GmailClient::token_refreshed`] afterwards to decide whether to persist
/// rotated credentials.
pub struct GmailClient {
  http: reqwest::Client,
  base_url: String,
  credentials: GmailCredentials,
  token_refreshed: bool,
}

impl GmailClient {
  pub const DEFAULT_BASE_URL: &'static str = "https://gmail.googleapis.com";

  /// Build a client, refreshing the access token if it has expired.
  ///
  /// A refresh failure leaves the stored credentials untouched and aborts
  /// the poll for this integration.
  pub async fn connect(
    credentials: GmailCredentials,
    base_url: &str,
  ) -> Result<Self, GmailError> {
    let mut client = Self {
      http: reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("http client"),
      base_url: base_url.trim_end_matches('/').to_string(),
      credentials,
      token_refreshed: false,
    };

    if client.credentials.expired() && !client.credentials.refresh_token.is_empty() {
      client.refresh_access_token().await?;
    }

    Ok(client)
  }

  /// The (possibly refreshed) credentials.
  pub fn credentials(&self) -> &GmailCredentials {
    &self.credentials
  }

  /// Whether `connect` rotated the access token.
  pub fn token_refreshed(&self) -> bool {
    self.token_refreshed
  }

  /// Fetch unread messages, newest first per Gmail's ordering.
  pub async fn unread_messages(&self, max_results: u32) -> Result<Vec<EmailMessage>, GmailError> {
    self.list_messages("is:unread", max_results).await
  }

  /// Fetch messages received after the given instant.
  pub async fn messages_since(
    &self,
    since: DateTime<Utc>,
    max_results: u32,
  ) -> Result<Vec<EmailMessage>, GmailError> {
    let query = format!("after:{}", since.timestamp());
    self.list_messages(&query, max_results).await
  }

  async fn list_messages(
    &self,
    query: &str,
    max_results: u32,
  ) -> Result<Vec<EmailMessage>, GmailError> {
    let max_results = max_results.to_string();
    let response = self
      .http
      .get(format!("{}/gmail/v1/users/me/messages", self.base_url))
      .query(&[("q", query), ("maxResults", max_results.as_str())])
      .bearer_auth(&self.credentials.access_token)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(GmailError::Api {
        status: status.as_u16(),
        body: response.text().await.unwrap_or_default(),
      });
    }

    let list: MessageList = response.json().await?;

    let mut messages = Vec::with_capacity(list.messages.len());
    for reference in list.messages {
      match self.message_details(&reference.id).await {
        Ok(message) => messages.push(message),
        Err(e) => {
          // One unreadable message should not sink the whole batch.
          warn!(message_id = %reference.id, error = %e, "failed to fetch message details");
        }
      }
    }

    Ok(messages)
  }

  async fn message_details(&self, message_id: &str) -> Result<EmailMessage, GmailError> {
    let response = self
      .http
      .get(format!(
        "{}/gmail/v1/users/me/messages/{}",
        self.base_url, message_id
      ))
      .query(&[("format", "full")])
      .bearer_auth(&self.credentials.access_token)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(GmailError::Api {
        status: status.as_u16(),
        body: response.text().await.unwrap_or_default(),
      });
    }

    let detail: MessageDetail = response.json().await?;
    Ok(build_message(message_id, detail))
  }

  async fn refresh_access_token(&mut self) -> Result<(), GmailError> {
    let response = self
      .http
      .post(&self.credentials.token_uri)
      .form(&[
        ("client_id", self.credentials.client_id.as_str()),
        ("client_secret", self.credentials.client_secret.as_str()),
        ("refresh_token", self.credentials.refresh_token.as_str()),
        ("grant_type", "refresh_token"),
      ])
      .send()
      .await
      .map_err(|e| GmailError::TokenRefresh(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(GmailError::TokenRefresh(format!("{}: {}", status, body)));
    }

    let refreshed: RefreshResponse = response
      .json()
      .await
      .map_err(|e| GmailError::TokenRefresh(e.to_string()))?;

    self.credentials.access_token = refreshed.access_token;
    self.credentials.expiry =
      Some(Utc::now() + chrono::Duration::seconds(refreshed.expires_in.unwrap_or(3600)));
    self.token_refreshed = true;
    Ok(())
  }
}

fn build_message(message_id: &str, detail: MessageDetail) -> EmailMessage {
  let empty = MessagePart::default();
  let payload = detail.payload.as_ref().unwrap_or(&empty);

  let subject = header(payload, "Subject");
  let sender = header(payload, "From");
  let to = header(payload, "To");
  let date = header(payload, "Date");

  let received_at = detail
    .internal_date
    .as_deref()
    .and_then(|ms| ms.parse::<i64>().ok())
    .and_then(DateTime::<Utc>::from_timestamp_millis)
    .map(|ts| ts.to_rfc3339())
    .or(date)
    .unwrap_or_default();

  EmailMessage {
    message_id: message_id.to_string(),
    thread_id: detail.thread_id.unwrap_or_default(),
    subject: subject.unwrap_or_else(|| "(No Subject)".to_string()),
    sender: sender.unwrap_or_else(|| "unknown@example.com".to_string()),
    to: to.unwrap_or_default(),
    body: extract_body(payload),
    attachments: collect_attachments(payload),
    received_at,
    snippet: detail.snippet.unwrap_or_default(),
    labels: detail.label_ids.unwrap_or_default(),
  }
}

fn header(payload: &MessagePart, name: &str) -> Option<String> {
  payload
    .headers
    .iter()
    .find(|h| h.name.eq_ignore_ascii_case(name))
    .map(|h| h.value.clone())
}

/// Prefer a `text/plain` part, fall back to `text/html`, recursing into
/// nested multiparts.
fn extract_body(payload: &MessagePart) -> String {
  if payload.parts.is_empty() {
    return payload
      .body
      .as_ref()
      .and_then(|body| body.data.as_deref())
      .map(decode_body)
      .unwrap_or_default();
  }

  let mut body = String::new();
  for part in &payload.parts {
    if part.mime_type == "text/plain" {
      if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
        body = decode_body(data);
        break;
      }
    } else if part.mime_type == "text/html" && body.is_empty() {
      if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
        body = decode_body(data);
      }
    } else if !part.parts.is_empty() {
      body = extract_body(part);
      if !body.is_empty() {
        break;
      }
    }
  }
  body
}

fn collect_attachments(payload: &MessagePart) -> Vec<EmailAttachment> {
  let mut attachments = Vec::new();
  for part in &payload.parts {
    if !part.filename.is_empty() {
      attachments.push(EmailAttachment {
        filename: part.filename.clone(),
        mime_type: part.mime_type.clone(),
        size: part.body.as_ref().map(|b| b.size).unwrap_or(0),
        attachment_id: part.body.as_ref().and_then(|b| b.attachment_id.clone()),
      });
    } else if !part.parts.is_empty() {
      attachments.extend(collect_attachments(part));
    }
  }
  attachments
}

/// Gmail body data is base64url, padded or not depending on the part.
fn decode_body(data: &str) -> String {
  let bytes = URL_SAFE
    .decode(data)
    .or_else(|_| URL_SAFE_NO_PAD.decode(data));
  match bytes {
    Ok(bytes) => String::from_utf8_lossy(&bytes).replace('\u{FFFD}', ""),
    Err(_) => String::new(),
  }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
  access_token: String,
  expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
  #[serde(default)]
  messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
  id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
  thread_id: Option<String>,
  label_ids: Option<Vec<String>>,
  snippet: Option<String>,
  internal_date: Option<String>,
  payload: Option<MessagePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
  #[serde(default)]
  mime_type: String,
  #[serde(default)]
  filename: String,
  #[serde(default)]
  headers: Vec<MessageHeader>,
  body: Option<PartBody>,
  #[serde(default)]
  parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
  name: String,
  value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
  #[serde(default)]
  size: u64,
  data: Option<String>,
  attachment_id: Option<String>,
}

#[cfg(test)]
mod tests {
  use base64::Engine;
  use base64::engine::general_purpose::URL_SAFE;

  use super::*;

  fn part(mime: &str, data: Option<&str>) -> MessagePart {
    MessagePart {
      mime_type: mime.to_string(),
      body: data.map(|d| PartBody {
        size: 0,
        data: Some(URL_SAFE.encode(d)),
        attachment_id: None,
      }),
      ..MessagePart::default()
    }
  }

  #[test]
  fn plain_text_part_wins_over_html() {
    let payload = MessagePart {
      parts: vec![
        part("text/html", Some("<b>html</b>")),
        part("text/plain", Some("plain")),
      ],
      ..MessagePart::default()
    };
    assert_eq!(extract_body(&payload), "plain");
  }

  #[test]
  fn html_is_the_fallback() {
    let payload = MessagePart {
      parts: vec![part("text/html", Some("<b>html</b>"))],
      ..MessagePart::default()
    };
    assert_eq!(extract_body(&payload), "<b>html</b>");
  }

  #[test]
  fn nested_multipart_is_searched() {
    let nested = MessagePart {
      mime_type: "multipart/alternative".to_string(),
      parts: vec![part("text/plain", Some("inner"))],
      ..MessagePart::default()
    };
    let payload = MessagePart {
      parts: vec![nested],
      ..MessagePart::default()
    };
    assert_eq!(extract_body(&payload), "inner");
  }

  #[test]
  fn single_part_message_uses_top_level_body() {
    let payload = part("text/plain", Some("top"));
    assert_eq!(extract_body(&payload), "top");
  }

  #[test]
  fn attachments_collected_from_nested_parts() {
    let nested = MessagePart {
      parts: vec![MessagePart {
        mime_type: "application/pdf".to_string(),
        filename: "deep.pdf".to_string(),
        body: Some(PartBody {
          size: 9,
          data: None,
          attachment_id: Some("att-9".to_string()),
        }),
        ..MessagePart::default()
      }],
      ..MessagePart::default()
    };
    let payload = MessagePart {
      parts: vec![
        MessagePart {
          mime_type: "image/png".to_string(),
          filename: "logo.png".to_string(),
          body: Some(PartBody {
            size: 4,
            data: None,
            attachment_id: Some("att-1".to_string()),
          }),
          ..MessagePart::default()
        },
        nested,
      ],
      ..MessagePart::default()
    };

    let attachments = collect_attachments(&payload);
    assert_eq!(attachments.len(), 2);
    assert_eq!(attachments[0].filename, "logo.png");
    assert_eq!(attachments[1].filename, "deep.pdf");
    assert_eq!(attachments[1].attachment_id.as_deref(), Some("att-9"));
  }

  #[test]
  fn credentials_roundtrip_through_map() {
    let credentials = GmailCredentials {
      access_token: "tok".to_string(),
      refresh_token: "ref".to_string(),
      token_uri: DEFAULT_TOKEN_URI.to_string(),
      client_id: "cid".to_string(),
      client_secret: "sec".to_string(),
      scopes: default_scopes(),
      expiry: None,
    };

    let map = credentials.to_map();
    assert_eq!(GmailCredentials::from_map(map).unwrap(), credentials);
  }

  #[test]
  fn credentials_require_an_access_token() {
    assert!(matches!(
      GmailCredentials::from_map(Map::new()),
      Err(GmailError::MissingCredential("access_token"))
    ));
  }

  #[test]
  fn expiry_in_the_past_counts_as_expired() {
    let mut credentials = GmailCredentials::from_map(
      serde_json::from_value(serde_json::json!({ "access_token": "t" })).unwrap(),
    )
    .unwrap();

    assert!(!credentials.expired(), "no expiry means not expired");

    credentials.expiry = Some(Utc::now() - chrono::Duration::hours(1));
    assert!(credentials.expired());

    credentials.expiry = Some(Utc::now() + chrono::Duration::hours(1));
    assert!(!credentials.expired());
  }
}
