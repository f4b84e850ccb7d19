//! Bridge service configuration.
//!
//! Configuration is loaded from environment variables. The local key set is
//! redacted in Debug output.

use common::jwt::MAX_LEEWAY;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3002";

/// Default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "authToken";

/// Default session cookie lifetime in seconds (one day).
pub const DEFAULT_COOKIE_MAX_AGE_SECONDS: u64 = 86_400;

/// Default outbound HTTP timeout in milliseconds.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Bridge service configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:3002").
    pub bind_address: String,

    /// Identity provider base URL. Also the trusted `iss` value.
    pub auth_server: String,

    /// Pre-provisioned key set (JSON). When set, no JWKS fetch ever happens.
    pub auth_server_jwks: Option<String>,

    /// Fixed expected audience. When unset, the request origin is used.
    pub jwt_audience: Option<String>,

    /// Expiry leeway in seconds (default 0, max 600).
    pub jwt_leeway_seconds: u64,

    pub cookie_name: String,

    pub cookie_max_age_seconds: u64,

    /// Timeout for outbound calls to the identity provider.
    pub http_timeout: Duration,

    /// Origins allowed to make credentialed cross-origin requests.
    pub cors_origins: Vec<String>,

    /// Grace period between readiness going false and server shutdown.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts the local key set.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("auth_server", &self.auth_server)
            .field(
                "auth_server_jwks",
                &self.auth_server_jwks.as_ref().map(|_| "[REDACTED]"),
            )
            .field("jwt_audience", &self.jwt_audience)
            .field("jwt_leeway_seconds", &self.jwt_leeway_seconds)
            .field("cookie_name", &self.cookie_name)
            .field("cookie_max_age_seconds", &self.cookie_max_age_seconds)
            .field("http_timeout", &self.http_timeout)
            .field("cors_origins", &self.cors_origins)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid auth server URL: {0}")]
    InvalidAuthServer(String),

    #[error("Invalid JWT leeway configuration: {0}")]
    InvalidJwtLeeway(String),

    #[error("Invalid cookie configuration: {0}")]
    InvalidCookie(String),

    #[error("Invalid numeric configuration: {0}")]
    InvalidNumber(String),

    #[error("Invalid AUTH_SERVER_JWKS: {0}")]
    InvalidJwks(String),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),
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

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
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
        let auth_server = non_empty(vars, "AUTH_SERVER")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_SERVER".to_string()))?;

        if reqwest::Url::parse(&auth_server).is_err() {
            return Err(ConfigError::InvalidAuthServer(format!(
                "AUTH_SERVER must be an absolute URL, got '{auth_server}'"
            )));
        }

        let bind_address = non_empty(vars, "BIND_ADDRESS")
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let auth_server_jwks = non_empty(vars, "AUTH_SERVER_JWKS");
        let jwt_audience = non_empty(vars, "JWT_AUDIENCE");

        let jwt_leeway_seconds = if let Some(value_str) = vars.get("JWT_LEEWAY_SECONDS") {
            let value: i64 = value_str.trim().parse().map_err(|e| {
                ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must be a valid integer, got '{value_str}': {e}"
                ))
            })?;

            if value < 0 {
                return Err(ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must not be negative, got {value}"
                )));
            }

            let value = value.unsigned_abs();
            if value > MAX_LEEWAY.as_secs() {
                return Err(ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must not exceed {} seconds, got {value}",
                    MAX_LEEWAY.as_secs()
                )));
            }

            value
        } else {
            0
        };

        let cookie_name =
            non_empty(vars, "COOKIE_NAME").unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());
        if !cookie_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidCookie(format!(
                "COOKIE_NAME must be alphanumeric (with '_' or '-'), got '{cookie_name}'"
            )));
        }

        let cookie_max_age_seconds =
            parse_u64(vars, "COOKIE_MAX_AGE", DEFAULT_COOKIE_MAX_AGE_SECONDS)?;

        let http_timeout_ms = parse_u64(vars, "HTTP_TIMEOUT_MS", DEFAULT_HTTP_TIMEOUT_MS)?;
        if http_timeout_ms == 0 {
            return Err(ConfigError::InvalidNumber(
                "HTTP_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        let cors_origins = vars
            .get("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let drain_seconds = parse_u64(vars, "DRAIN_SECONDS", 0)?;

        Ok(Config {
            bind_address,
            auth_server,
            auth_server_jwks,
            jwt_audience,
            jwt_leeway_seconds,
            cookie_name,
            cookie_max_age_seconds,
            http_timeout: Duration::from_millis(http_timeout_ms),
            cors_origins,
            drain_seconds,
        })
    }

    /// The URL of the identity provider's key set document.
    #[must_use]
    pub fn jwks_url(&self) -> String {
        format!("{}/auth/jwks", self.auth_server.trim_end_matches('/'))
    }

    /// The URL of the identity provider's session lookup endpoint.
    #[must_use]
    pub fn session_url(&self) -> String {
        format!("{}/auth/get-session", self.auth_server.trim_end_matches('/'))
    }

    #[must_use]
    pub fn leeway(&self) -> Duration {
        Duration::from_secs(self.jwt_leeway_seconds)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "AUTH_SERVER".to_string(),
            "https://idp.example.com".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address, "0.0.0.0:3002");
        assert_eq!(config.auth_server, "https://idp.example.com");
        assert!(config.auth_server_jwks.is_none());
        assert!(config.jwt_audience.is_none());
        assert_eq!(config.jwt_leeway_seconds, 0);
        assert_eq!(config.cookie_name, "authToken");
        assert_eq!(config.cookie_max_age_seconds, 86_400);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.drain_seconds, 0);
        assert_eq!(config.jwks_url(), "https://idp.example.com/auth/jwks");
        assert_eq!(
            config.session_url(),
            "https://idp.example.com/auth/get-session"
        );
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("AUTH_SERVER".to_string(), "http://localhost:3000/".to_string());
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:4000".to_string());
        vars.insert("JWT_AUDIENCE".to_string(), "https://svc-a.example.com".to_string());
        vars.insert("JWT_LEEWAY_SECONDS".to_string(), "30".to_string());
        vars.insert("COOKIE_NAME".to_string(), "bridge_session".to_string());
        vars.insert("COOKIE_MAX_AGE".to_string(), "3600".to_string());
        vars.insert("HTTP_TIMEOUT_MS".to_string(), "2500".to_string());
        vars.insert(
            "CORS_ORIGINS".to_string(),
            "http://localhost:3000, http://localhost:3001,".to_string(),
        );
        vars.insert("DRAIN_SECONDS".to_string(), "5".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.auth_server, "http://localhost:3000/");
        assert_eq!(config.jwks_url(), "http://localhost:3000/auth/jwks");
        assert_eq!(config.bind_address, "127.0.0.1:4000");
        assert_eq!(config.jwt_audience.as_deref(), Some("https://svc-a.example.com"));
        assert_eq!(config.leeway(), Duration::from_secs(30));
        assert_eq!(config.cookie_name, "bridge_session");
        assert_eq!(config.cookie_max_age_seconds, 3600);
        assert_eq!(config.http_timeout, Duration::from_millis(2500));
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:3000", "http://localhost:3001"]
        );
        assert_eq!(config.drain_seconds, 5);
    }

    #[test]
    fn test_from_vars_missing_auth_server() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "AUTH_SERVER"));
    }

    #[test]
    fn test_from_vars_rejects_relative_auth_server() {
        let mut vars = base_vars();
        vars.insert("AUTH_SERVER".to_string(), "idp.example.com".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidAuthServer(_))
        ));
    }

    #[test]
    fn test_jwt_leeway_rejects_negative() {
        let mut vars = base_vars();
        vars.insert("JWT_LEEWAY_SECONDS".to_string(), "-1".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtLeeway(msg)) if msg.contains("must not be negative"))
        );
    }

    #[test]
    fn test_jwt_leeway_rejects_too_large() {
        let mut vars = base_vars();
        vars.insert("JWT_LEEWAY_SECONDS".to_string(), "601".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtLeeway(msg)) if msg.contains("must not exceed 600"))
        );
    }

    #[test]
    fn test_jwt_leeway_accepts_max() {
        let mut vars = base_vars();
        vars.insert("JWT_LEEWAY_SECONDS".to_string(), "600".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.jwt_leeway_seconds, 600);
    }

    #[test]
    fn test_jwt_leeway_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("JWT_LEEWAY_SECONDS".to_string(), "a-minute".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtLeeway(msg)) if msg.contains("must be a valid integer"))
        );
    }

    #[test]
    fn test_cookie_name_rejects_separators() {
        let mut vars = base_vars();
        vars.insert("COOKIE_NAME".to_string(), "auth;Token".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidCookie(_))
        ));
    }

    #[test]
    fn test_cookie_max_age_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("COOKIE_MAX_AGE".to_string(), "one-day".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidNumber(msg)) if msg.contains("COOKIE_MAX_AGE"))
        );
    }

    #[test]
    fn test_http_timeout_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("HTTP_TIMEOUT_MS".to_string(), "0".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_debug_redacts_local_jwks() {
        let mut vars = base_vars();
        vars.insert(
            "AUTH_SERVER_JWKS".to_string(),
            r#"{"kty":"OKP","crv":"Ed25519","x":"secret-looking"}"#.to_string(),
        );
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("secret-looking"));
    }
}
