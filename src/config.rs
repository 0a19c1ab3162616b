use std::env;

/// Process configuration, read from the environment (with `.env` support in
/// `main`). Every value has a development default; production deployments
/// override them.
#[derive(Debug, Clone)]
pub struct Settings {
  pub database_url: String,
  /// Reserved for a future queue/cache backend; unused by the core.
  pub redis_url: String,
  /// JWT settings belong to the external auth layer; parsed so deployments
  /// can validate their environment in one place.
  pub jwt_secret: String,
  pub jwt_algorithm: String,
  pub jwt_expiration_minutes: u64,
  /// Fallback key for summarize nodes that do not carry their own.
  pub openai_api_key: Option<String>,
  pub encryption_key: String,
  pub cors_origins: Vec<String>,
  pub dev_mode: bool,
  pub port: u16,
  pub gmail_poll_interval_secs: u64,
}

impl Settings {
  pub fn from_env() -> Self {
    Self {
      database_url: var_or("DATABASE_URL", "sqlite://agentkit.db"),
      redis_url: var_or("REDIS_URL", "redis://localhost:6379/0"),
      jwt_secret: var_or("JWT_SECRET", "change-me-in-production"),
      jwt_algorithm: var_or("JWT_ALGORITHM", "HS256"),
      jwt_expiration_minutes: parsed_var("JWT_EXPIRATION_MINUTES", 1440),
      openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
      encryption_key: var_or("ENCRYPTION_KEY", "change-me-32-byte-key-for-fernet!"),
      cors_origins: var_or("CORS_ORIGINS", "http://localhost:3000")
        .split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect(),
      dev_mode: matches!(
        var_or("DEV_MODE", "false").to_lowercase().as_str(),
        "1" | "true" | "yes"
      ),
      port: parsed_var("PORT", 8000),
      gmail_poll_interval_secs: parsed_var("GMAIL_POLL_INTERVAL_SECS", 60),
    }
  }
}

fn var_or(key: &str, default: &str) -> String {
  env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> T {
  env::var(key)
    .ok()
    .and_then(|value| value.parse().ok())
    .unwrap_or(default)
}
