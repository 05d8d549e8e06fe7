use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use vrtrust_core::error::CoreError;
use vrtrust_core::normalizer::canonical_source;
use vrtrust_events::DeliveryConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long background tasks get to drain on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Largest accepted request body, inbound webhooks and CSV uploads included.
    pub max_body_bytes: usize,
    /// Emit JSON logs instead of the human-readable format.
    pub log_json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `MAX_BODY_BYTES`       | `1048576`                  |
    /// | `LOG_FORMAT`           | `pretty` (`json` to switch)|
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let log_json = std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Self {
            host,
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            max_body_bytes: env_or("MAX_BODY_BYTES", 1024 * 1024),
            log_json,
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Load the delivery engine configuration.
///
/// | Env Var                     | Default                   |
/// |-----------------------------|---------------------------|
/// | `WEBHOOK_MAX_RETRIES`       | `5`                       |
/// | `WEBHOOK_TIMEOUT_SECS`      | `10`                      |
/// | `WEBHOOK_RETRY_SWEEP_SECS`  | `900`                     |
/// | `WEBHOOK_BACKOFF_BASE_SECS` | `1`                       |
/// | `WEBHOOK_STALE_SECS`        | 2 x timeout               |
/// | `WEBHOOK_USER_AGENT`        | `vrtrust-webhooks/<ver>`  |
pub fn delivery_config_from_env() -> DeliveryConfig {
    let defaults = DeliveryConfig::default();
    let max_retries: i32 = env_or("WEBHOOK_MAX_RETRIES", defaults.max_retries);
    assert!(max_retries >= 1, "WEBHOOK_MAX_RETRIES must be at least 1");
    let request_timeout = Duration::from_secs(env_or(
        "WEBHOOK_TIMEOUT_SECS",
        defaults.request_timeout.as_secs(),
    ));

    DeliveryConfig {
        max_retries,
        request_timeout,
        sweep_interval: Duration::from_secs(env_or(
            "WEBHOOK_RETRY_SWEEP_SECS",
            defaults.sweep_interval.as_secs(),
        )),
        stale_after: Duration::from_secs(env_or(
            "WEBHOOK_STALE_SECS",
            2 * request_timeout.as_secs(),
        )),
        backoff_base_secs: env_or("WEBHOOK_BACKOFF_BASE_SECS", defaults.backoff_base_secs),
        user_agent: std::env::var("WEBHOOK_USER_AGENT").unwrap_or(defaults.user_agent),
        ..defaults
    }
}

/// Parse `name` from the environment, falling back to `default` when unset.
///
/// Panics on an unparsable value so misconfiguration fails at startup.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid value: {e}")),
        Err(_) => default,
    }
}

// ---------------------------------------------------------------------------
// Inbound secrets
// ---------------------------------------------------------------------------

/// Per-source HMAC secrets used to verify inbound webhooks.
#[derive(Debug, Clone, Default)]
pub struct InboundSecrets {
    secrets: HashMap<String, String>,
}

impl InboundSecrets {
    /// Parse `source=secret` pairs separated by commas.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let mut secrets = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (source, secret) = entry.split_once('=').ok_or_else(|| {
                CoreError::Validation(format!("Expected source=secret, got '{entry}'"))
            })?;
            let source = canonical_source(source).ok_or_else(|| {
                CoreError::Validation(format!("Invalid source name '{}'", source.trim()))
            })?;
            let secret = secret.trim();
            if secret.is_empty() {
                return Err(CoreError::Validation(format!(
                    "Secret for source '{source}' must not be empty"
                )));
            }
            secrets.insert(source, secret.to_string());
        }
        Ok(Self { secrets })
    }

    /// Load from `INBOUND_WEBHOOK_SECRETS`. Panics on a malformed value.
    pub fn from_env() -> Self {
        let raw = std::env::var("INBOUND_WEBHOOK_SECRETS").unwrap_or_default();
        Self::parse(&raw).unwrap_or_else(|e| panic!("INBOUND_WEBHOOK_SECRETS is invalid: {e}"))
    }

    pub fn with_secret(mut self, source: &str, secret: &str) -> Self {
        self.secrets.insert(source.to_string(), secret.to_string());
        self
    }

    pub fn get(&self, source: &str) -> Option<&str> {
        self.secrets.get(source).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_source_secret_pairs() {
        let secrets = InboundSecrets::parse(" GitHub=abc , identity = def,").unwrap();
        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets.get("github"), Some("abc"));
        assert_eq!(secrets.get("identity"), Some("def"));
        assert_eq!(secrets.get("notion"), None);
    }

    #[test]
    fn empty_value_means_no_secrets() {
        assert!(InboundSecrets::parse("").unwrap().is_empty());
    }

    #[test]
    fn malformed_entries_are_rejected() {
        assert_matches!(InboundSecrets::parse("github"), Err(CoreError::Validation(_)));
        assert_matches!(InboundSecrets::parse("github="), Err(CoreError::Validation(_)));
        assert_matches!(InboundSecrets::parse("bad source=x"), Err(CoreError::Validation(_)));
    }
}
