use std::time::{Duration, SystemTime, UNIX_EPOCH};

use agentkit_store::Store;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{HandlerConfig, HandlerError, HandlerOutcome, NodeHandler, non_empty_str, stringify};

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The seven default columns, in append order, when a node does not supply
/// `row_values`.
const COLUMN_FIELDS: [&str; 7] = [
  "col_subject",
  "col_sender",
  "col_summary",
  "col_category",
  "col_sentiment",
  "col_action_items",
  "col_received_at",
];

/// Appends one row to a Google Sheet.
///
/// Auth priority: a service-account JSON key (signed RS256 assertion
/// exchanged for an access token), then a raw OAuth2 bearer token.
#[derive(Debug)]
pub struct GoogleSheetsHandler {
  http: reqwest::Client,
  base_url: String,
  token_url: String,
}

impl GoogleSheetsHandler {
  pub fn new(config: &HandlerConfig) -> Self {
    Self {
      http: reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("http client"),
      base_url: config.sheets_base_url.trim_end_matches('/').to_string(),
      token_url: config.google_token_url.clone(),
    }
  }

  /// Exchange a signed service-account assertion for an access token.
  async fn service_account_token(&self, key_json: &str) -> Result<String, HandlerError> {
    let key: ServiceAccountKey = serde_json::from_str(key_json)
      .map_err(|_| HandlerError::Config("service_account_json is not valid JSON.".to_string()))?;

    let issued_at = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs();

    let claims = AssertionClaims {
      iss: &key.client_email,
      scope: SHEETS_SCOPE,
      aud: &self.token_url,
      iat: issued_at,
      exp: issued_at + 3600,
    };

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
      HandlerError::Config(format!("service account private key is not valid PEM: {}", e))
    })?;
    let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
      .map_err(|e| HandlerError::Config(format!("failed to sign service account assertion: {}", e)))?;

    let response = self
      .http
      .post(&self.token_url)
      .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
      .send()
      .await
      .map_err(|e| HandlerError::upstream("google auth", e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(HandlerError::upstream(
        "google auth",
        format!("token exchange returned {}: {}", status, body),
      ));
    }

    let token: TokenResponse = response
      .json()
      .await
      .map_err(|e| HandlerError::upstream("google auth", format!("malformed token response: {}", e)))?;
    Ok(token.access_token)
  }
}

#[async_trait]
impl NodeHandler for GoogleSheetsHandler {
  async fn execute(
    &self,
    data: &Map<String, Value>,
    _context: &Map<String, Value>,
    _store: &dyn Store,
  ) -> Result<HandlerOutcome, HandlerError> {
    let spreadsheet_id = non_empty_str(data, "spreadsheet_id")
      .ok_or_else(|| HandlerError::Config("Google Sheets: spreadsheet_id is required.".to_string()))?;
    let sheet_name = non_empty_str(data, "sheet_name").unwrap_or("Sheet1");

    let values = build_row(data);

    let access_token = if let Some(key_json) = non_empty_str(data, "service_account_json") {
      self.service_account_token(key_json).await?
    } else if let Some(bearer) = non_empty_str(data, "bearer_token") {
      bearer.to_string()
    } else {
      return Err(HandlerError::Config(
        "Google Sheets: provide either a service_account_json or bearer_token in the node config."
          .to_string(),
      ));
    };

    let url = format!(
      "{}/v4/spreadsheets/{}/values/{}!A1:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS",
      self.base_url, spreadsheet_id, sheet_name
    );

    let response = self
      .http
      .post(url)
      .bearer_auth(access_token)
      .json(&json!({ "values": [values] }))
      .send()
      .await
      .map_err(|e| HandlerError::upstream("google sheets", e.to_string()))?;

    let status = response.status();
    let body: Value = match response.text().await {
      Ok(text) => serde_json::from_str(&text).unwrap_or(json!({ "raw": text })),
      Err(e) => return Err(HandlerError::upstream("google sheets", e.to_string())),
    };

    if !status.is_success() {
      return Err(HandlerError::upstream(
        "google sheets",
        format!("append returned {}: {}", status, body),
      ));
    }

    let updates = body.get("updates").cloned().unwrap_or(json!({}));
    let Value::Object(output) = json!({
      "status": "appended",
      "spreadsheet_id": spreadsheet_id,
      "sheet_name": sheet_name,
      "row_values": values,
      "updated_range": updates.get("updatedRange").and_then(Value::as_str).unwrap_or(""),
      "updated_rows": updates.get("updatedRows").and_then(Value::as_u64).unwrap_or(1),
    }) else {
      unreachable!()
    };

    Ok(HandlerOutcome::output(output))
  }
}

/// Build the row to append: an explicit `row_values` list, a JSON-array
/// string, or the seven `col_*` fields in fixed order.
fn build_row(data: &Map<String, Value>) -> Vec<String> {
  let template: Vec<Value> = match data.get("row_values") {
    Some(Value::Array(items)) => items.clone(),
    Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
      Ok(Value::Array(items)) => items,
      _ => vec![Value::String(s.clone())],
    },
    _ => Vec::new(),
  };

  if !template.is_empty() {
    return template.iter().map(|v| stringify(Some(v))).collect();
  }

  COLUMN_FIELDS
    .iter()
    .map(|field| stringify(data.get(*field)))
    .collect()
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
  client_email: String,
  private_key: String,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
  iss: &'a str,
  scope: &'a str,
  aud: &'a str,
  iat: u64,
  exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
}
