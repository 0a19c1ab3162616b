use std::sync::Arc;

use agentkit_credentials::CredentialSealer;
use agentkit_executor::WorkflowExecutor;
use agentkit_gmail::GmailPoller;
use agentkit_store::Store;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn Store>,
  pub executor: Arc<WorkflowExecutor>,
  pub poller: Arc<GmailPoller>,
  pub sealer: Arc<CredentialSealer>,
  /// The dev-mode default owner; real authentication is a separate layer.
  pub user_id: String,
}
