use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// HTTP-facing error: every failure becomes `{"detail": "..."}` with the
/// matching status code.
#[derive(Debug)]
pub enum ApiError {
  NotFound(String),
  BadRequest(String),
  Internal(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, detail) = match self {
      ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
      ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
      ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
    };
    (status, Json(json!({ "detail": detail }))).into_response()
  }
}

impl From<agentkit_store::Error> for ApiError {
  fn from(e: agentkit_store::Error) -> Self {
    match e {
      agentkit_store::Error::NotFound(what) => ApiError::NotFound(format!("Not found: {}", what)),
      other => ApiError::Internal(other.to_string()),
    }
  }
}

impl From<agentkit_executor::ExecuteError> for ApiError {
  fn from(e: agentkit_executor::ExecuteError) -> Self {
    ApiError::Internal(e.to_string())
  }
}

impl From<agentkit_gmail::GmailError> for ApiError {
  fn from(e: agentkit_gmail::GmailError) -> Self {
    ApiError::BadRequest(e.to_string())
  }
}

impl From<agentkit_credentials::CredentialError> for ApiError {
  fn from(e: agentkit_credentials::CredentialError) -> Self {
    ApiError::BadRequest(e.to_string())
  }
}
