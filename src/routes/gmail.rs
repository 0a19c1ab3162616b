use agentkit_gmail::{EmailMessage, GmailClient, GmailCredentials};
use agentkit_store::{Integration, Json as DbJson};
use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

const GMAIL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

#[derive(Debug, Deserialize)]
pub struct GmailCredentialsCreate {
  name: String,
  access_token: String,
  refresh_token: String,
  client_id: String,
  client_secret: String,
  scopes: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct GmailTestResponse {
  status: String,
  message: String,
  emails: Option<Vec<EmailMessage>>,
}

/// `POST /api/gmail/setup`: connect a Gmail account.
///
/// Validates the credentials by constructing a client (refreshing the token
/// if it is already expired), then stores the sealed bundle as an active
/// integration.
pub async fn setup_integration(
  State(state): State<AppState>,
  Json(payload): Json<GmailCredentialsCreate>,
) -> Result<Json<Integration>, ApiError> {
  let scopes = payload.scopes.unwrap_or_else(|| vec![GMAIL_SCOPE.to_string()]);

  let Value::Object(credential_map) = json!({
    "access_token": payload.access_token,
    "refresh_token": payload.refresh_token,
    "token_uri": "https://oauth2.googleapis.com/token",
    "client_id": payload.client_id,
    "client_secret": payload.client_secret,
    "scopes": scopes,
  }) else {
    unreachable!()
  };

  let credentials = GmailCredentials::from_map(credential_map)?;
  let client = GmailClient::connect(credentials, GmailClient::DEFAULT_BASE_URL).await?;

  let sealed = state.sealer.seal(&client.credentials().to_map())?;
  let mut integration = Integration::new(&state.user_id, &payload.name, "gmail", sealed);
  integration.metadata = DbJson(json!({
    "email": "configured",
    "scopes": client.credentials().scopes,
  }));

  state.store.create_integration(&integration).await?;
  Ok(Json(integration))
}

/// `POST /api/gmail/{integration_id}/test`: fetch a few unread emails to
/// prove the connection works.
pub async fn test_integration(
  State(state): State<AppState>,
  Path(integration_id): Path<String>,
) -> Result<Json<GmailTestResponse>, ApiError> {
  let integration = gmail_integration(&state, &integration_id).await?;

  let credentials = GmailCredentials::from_map(state.sealer.unseal(&integration.credentials_sealed)?)?;
  let original_token = credentials.access_token.clone();

  let client = GmailClient::connect(credentials, GmailClient::DEFAULT_BASE_URL).await?;
  let messages = client.unread_messages(5).await?;

  if client.credentials().access_token != original_token {
    let sealed = state.sealer.seal(&client.credentials().to_map())?;
    state
      .store
      .update_integration_credentials(&integration.id, &sealed)
      .await?;
  }

  Ok(Json(GmailTestResponse {
    status: "success".to_string(),
    message: format!("Successfully connected. Found {} unread emails.", messages.len()),
    emails: Some(messages),
  }))
}

/// `POST /api/gmail/{integration_id}/poll-now`: run one poll tick for a
/// single integration, outside the background schedule.
pub async fn poll_now(
  State(state): State<AppState>,
  Path(integration_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
  let integration = gmail_integration(&state, &integration_id).await?;

  let fetched = state.poller.poll_integration(&integration).await?;

  Ok(Json(json!({
    "status": "success",
    "message": format!("Gmail polling triggered successfully ({} messages)", fetched),
  })))
}

/// `GET /api/gmail/oauth-instructions`: how to provision OAuth2
/// credentials for the setup call.
pub async fn oauth_instructions() -> Json<Value> {
  Json(json!({
    "instructions": [
      "1. Go to Google Cloud Console: https://console.cloud.google.com/",
      "2. Create a new project or select an existing one",
      "3. Enable Gmail API: Navigate to 'APIs & Services' > 'Library' > Search 'Gmail API' > Enable",
      "4. Create OAuth2 Credentials:",
      "   - Go to 'APIs & Services' > 'Credentials'",
      "   - Click 'Create Credentials' > 'OAuth client ID'",
      "   - Application type: 'Web application'",
      "   - Add authorized redirect URIs (e.g. http://localhost:3000/auth/gmail/callback)",
      "5. Download the credentials JSON file",
      "6. Use the client_id and client_secret from the JSON file",
      "7. Generate access_token and refresh_token using the OAuth2 flow:",
      "   - Use the OAuth2 playground: https://developers.google.com/oauthplayground/",
      "   - Or implement the OAuth2 flow in your frontend",
      "8. Required scopes: https://www.googleapis.com/auth/gmail.readonly",
      "9. Call /api/gmail/setup with the credentials",
    ],
    "required_scopes": [GMAIL_SCOPE],
    "example_payload": {
      "name": "My Gmail Account",
      "access_token": "ya29.a0AfH6SMBx...",
      "refresh_token": "1//0gZ9X...",
      "client_id": "123456789.apps.googleusercontent.com",
      "client_secret": "GOCSPX-...",
      "scopes": [GMAIL_SCOPE],
    },
  }))
}

/// Look up a Gmail integration owned by the current user.
async fn gmail_integration(state: &AppState, integration_id: &str) -> Result<Integration, ApiError> {
  let integration = state.store.get_integration(integration_id).await?;
  if integration.kind != "gmail" || integration.user_id != state.user_id {
    return Err(ApiError::NotFound("Gmail integration not found".to_string()));
  }
  Ok(integration)
}
