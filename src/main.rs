mod config;
mod error;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use agentkit_credentials::CredentialSealer;
use agentkit_executor::WorkflowExecutor;
use agentkit_gmail::GmailPoller;
use agentkit_node::{HandlerConfig, HandlerRegistry};
use agentkit_store::{SqliteStore, Store};

use crate::config::Settings;
use crate::state::AppState;

/// AgentKit - workflow automation backend
#[derive(Parser)]
#[command(name = "agentkit")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Port to listen on (overrides the PORT environment variable)
  #[arg(long)]
  port: Option<u16>,

  /// Database URL (overrides the DATABASE_URL environment variable)
  #[arg(long)]
  database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  let cli = Cli::parse();

  let mut settings = Settings::from_env();
  if let Some(port) = cli.port {
    settings.port = port;
  }
  if let Some(database_url) = cli.database_url {
    settings.database_url = database_url;
  }

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let store = Arc::new(
    SqliteStore::connect(&settings.database_url)
      .await
      .with_context(|| format!("failed to open database: {}", settings.database_url))?,
  );
  store.migrate().await.context("failed to run migrations")?;

  // Authentication is an external layer; records created through the API
  // belong to the dev-mode default user.
  let user_id = store
    .ensure_user("dev@agentkit.local")
    .await
    .context("failed to ensure default user")?;

  let dyn_store: Arc<dyn Store> = store.clone();
  let sealer = Arc::new(CredentialSealer::new(&settings.encryption_key));
  let registry = Arc::new(HandlerRegistry::builtin(HandlerConfig {
    openai_api_key: settings.openai_api_key.clone(),
    ..HandlerConfig::default()
  }));
  let executor = Arc::new(WorkflowExecutor::new(dyn_store.clone(), registry));
  let poller = Arc::new(
    GmailPoller::new(dyn_store.clone(), executor.clone(), sealer.clone())
      .with_poll_interval(Duration::from_secs(settings.gmail_poll_interval_secs)),
  );

  // The poller lives for the whole server lifetime; shutdown cancels it
  // after the listener drains.
  let cancel = CancellationToken::new();
  let poller_task = tokio::spawn(poller.clone().run(cancel.clone()));

  let app = routes::router(AppState {
    store: dyn_store,
    executor,
    poller,
    sealer,
    user_id,
  })
  .layer(cors_layer(&settings));

  let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port))
    .await
    .with_context(|| format!("failed to bind port {}", settings.port))?;
  info!(port = settings.port, "agentkit listening");

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  cancel.cancel();
  let _ = poller_task.await;
  info!("agentkit shut down");

  Ok(())
}

fn cors_layer(settings: &Settings) -> CorsLayer {
  if settings.dev_mode {
    return CorsLayer::permissive();
  }

  let origins: Vec<HeaderValue> = settings
    .cors_origins
    .iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();

  CorsLayer::new()
    .allow_origin(origins)
    .allow_methods(Any)
    .allow_headers(Any)
}

async fn shutdown_signal() {
  let _ = tokio::signal::ctrl_c().await;
}
