//! Bridge client error types.
//!
//! `ClientError` is `Clone` so every waiter on a shared in-flight
//! acquisition receives the same failure.

use common::config::FetchError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The IdP has no authenticated session to issue a token for.
    #[error("No auth token available")]
    NoToken,

    /// Transport failure or per-request timeout.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The peer answered with a non-2xx status.
    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// The response body was not what was expected.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Token acquisition exceeded its overall bound.
    #[error("Token acquisition timed out")]
    Timeout,

    /// The acquisition task ended without producing a result.
    #[error("Token acquisition aborted: {0}")]
    AcquisitionAborted(String),

    /// Request blocked by the configured request mode.
    #[error("Request blocked: {0}")]
    Blocked(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<FetchError> for ClientError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::CrossOriginBlocked(_) => ClientError::Blocked(err.to_string()),
            FetchError::ClientBuild(msg) => ClientError::Configuration(msg),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ClientError::HttpStatus(status.as_u16()),
            None => ClientError::Http(err.to_string()),
        }
    }
}

impl ClientError {
    /// Short, bounded label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ClientError::NoToken => "no_token",
            ClientError::Http(_) => "transport",
            ClientError::HttpStatus(_) => "http_status",
            ClientError::InvalidResponse(_) => "invalid_response",
            ClientError::Timeout => "timeout",
            ClientError::AcquisitionAborted(_) => "aborted",
            ClientError::Blocked(_) => "blocked",
            ClientError::Configuration(_) => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_token_message() {
        assert_eq!(ClientError::NoToken.to_string(), "No auth token available");
    }

    #[test]
    fn test_from_fetch_error() {
        assert!(matches!(
            ClientError::from(FetchError::CrossOriginBlocked("https://x".to_string())),
            ClientError::Blocked(msg) if msg.contains("https://x")
        ));
        assert!(matches!(
            ClientError::from(FetchError::ClientBuild("tls".to_string())),
            ClientError::Configuration(_)
        ));
    }
}
