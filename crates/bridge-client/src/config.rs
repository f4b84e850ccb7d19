//! Bridge client configuration.
//!
//! Configuration is loaded from environment variables.

use common::config::{CredentialsMode, FetchOptions, DEFAULT_HTTP_TIMEOUT};
use common::retry::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS,
};
use reqwest::Url;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default fraction of a token's lifetime after which it is refreshed.
pub const DEFAULT_EARLY_REFRESH_FACTOR: f64 = 0.77;

/// Default bound on one token acquisition.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifetime assumed for tokens that carry no `exp`.
pub const FALLBACK_TOKEN_LIFETIME: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid early refresh factor: {0}")]
    InvalidRefreshFactor(String),

    #[error("Invalid numeric configuration: {0}")]
    InvalidNumber(String),
}

/// Bridge client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identity provider base URL, without a trailing slash.
    pub auth_server: Url,

    /// Dependent service base URLs tokens are propagated to.
    pub services: Vec<Url>,

    /// Fraction of the token lifetime after which the cache refreshes (0 < f <= 1).
    pub early_refresh_factor: f64,

    /// Bound on one token acquisition, including waiting for the IdP.
    pub acquire_timeout: Duration,

    /// Options for every outbound request.
    pub fetch: FetchOptions,

    /// Retry policy for `register`.
    pub register_policy: RetryPolicy,

    /// Retry policy for `clear`.
    pub clear_policy: RetryPolicy,
}

fn parse_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim_end_matches('/'))
        .map_err(|e| ConfigError::InvalidUrl(format!("'{value}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl(format!("'{value}' is not a base URL")));
    }
    Ok(url)
}

fn parse_u64(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<u64, ConfigError> {
    match vars.get(name) {
        Some(value_str) => value_str.trim().parse().map_err(|e| {
            ConfigError::InvalidNumber(format!(
                "{name} must be a valid non-negative integer, got '{value_str}': {e}"
            ))
        }),
        None => Ok(default),
    }
}

fn parse_f64(vars: &HashMap<String, String>, name: &str, default: f64) -> Result<f64, ConfigError> {
    match vars.get(name) {
        Some(value_str) => value_str.trim().parse().map_err(|e| {
            ConfigError::InvalidNumber(format!(
                "{name} must be a number, got '{value_str}': {e}"
            ))
        }),
        None => Ok(default),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ClientConfig {
    /// Configuration with defaults for `auth_server` and `services`.
    #[must_use]
    pub fn new(auth_server: Url, services: Vec<Url>) -> Self {
        Self {
            auth_server,
            services,
            early_refresh_factor: DEFAULT_EARLY_REFRESH_FACTOR,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            fetch: FetchOptions::default().with_credentials(CredentialsMode::Include),
            register_policy: RetryPolicy::default(),
            clear_policy: RetryPolicy::no_retry(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value is invalid.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let auth_server = vars
            .get("AUTH_SERVER")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_SERVER".to_string()))
            .and_then(parse_url)?;

        let services = vars
            .get("BRIDGE_SERVICES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(parse_url)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let early_refresh_factor =
            parse_f64(vars, "EARLY_REFRESH_FACTOR", DEFAULT_EARLY_REFRESH_FACTOR)?;
        if !(early_refresh_factor > 0.0 && early_refresh_factor <= 1.0) {
            return Err(ConfigError::InvalidRefreshFactor(format!(
                "EARLY_REFRESH_FACTOR must be in (0, 1], got {early_refresh_factor}"
            )));
        }

        let acquire_timeout_ms =
            parse_u64(vars, "ACQUIRE_TIMEOUT_MS", millis(DEFAULT_ACQUIRE_TIMEOUT))?;
        let http_timeout_ms = parse_u64(vars, "HTTP_TIMEOUT_MS", millis(DEFAULT_HTTP_TIMEOUT))?;
        if acquire_timeout_ms == 0 || http_timeout_ms == 0 {
            return Err(ConfigError::InvalidNumber(
                "ACQUIRE_TIMEOUT_MS and HTTP_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        let max_attempts = parse_u64(
            vars,
            "PROPAGATION_MAX_ATTEMPTS",
            u64::from(DEFAULT_MAX_ATTEMPTS),
        )?;
        let max_attempts = u32::try_from(max_attempts)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidNumber(format!(
                    "PROPAGATION_MAX_ATTEMPTS must be between 1 and {}, got {max_attempts}",
                    u32::MAX
                ))
            })?;

        let base_delay_ms =
            parse_u64(vars, "PROPAGATION_BASE_DELAY_MS", millis(DEFAULT_BASE_DELAY))?;

        let backoff_multiplier = parse_f64(
            vars,
            "PROPAGATION_BACKOFF_MULTIPLIER",
            DEFAULT_BACKOFF_MULTIPLIER,
        )?;
        if !(backoff_multiplier.is_finite() && backoff_multiplier >= 1.0) {
            return Err(ConfigError::InvalidNumber(format!(
                "PROPAGATION_BACKOFF_MULTIPLIER must be at least 1, got {backoff_multiplier}"
            )));
        }

        let mut config = Self::new(auth_server, services);
        config.early_refresh_factor = early_refresh_factor;
        config.acquire_timeout = Duration::from_millis(acquire_timeout_ms);
        config.fetch = config
            .fetch
            .with_timeout(Duration::from_millis(http_timeout_ms));
        config.register_policy = RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_base_delay(Duration::from_millis(base_delay_ms))
            .with_backoff_multiplier(backoff_multiplier);

        Ok(config)
    }

    /// The IdP token issuance endpoint.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/auth/token", self.auth_server.as_str().trim_end_matches('/'))
    }
}
