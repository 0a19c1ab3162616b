//! Gmail event source.
//!
//! Two pieces: a thin REST client for the Gmail API (list messages, fetch
//! full messages, refresh OAuth2 access tokens) and the [`GmailPoller`], a
//! long-lived background task that watches every active Gmail integration
//! and dispatches matching published workflows when new mail arrives.
//!
//! Delivery is at-least-once, not exactly-once: the poller's per-integration
//! `last_check` watermark lives in memory only, so a process restart
//! re-fetches recent unread mail and downstream workflows must tolerate
//! duplicates.

mod client;
mod poller;

pub use client::{EmailAttachment, EmailMessage, GmailClient, GmailCredentials};
pub use poller::GmailPoller;

use thiserror::Error;

/// Errors from the Gmail client and poller.
#[derive(Debug, Error)]
pub enum GmailError {
  #[error("gmail request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("gmail api returned {status}: {body}")]
  Api { status: u16, body: String },

  #[error("oauth token refresh failed: {0}")]
  TokenRefresh(String),

  #[error("credentials are missing required field '{0}'")]
  MissingCredential(&'static str),

  #[error(transparent)]
  Credentials(#[from] agentkit_credentials::CredentialError),

  #[error(transparent)]
  Store(#[from] agentkit_store::Error),
}
