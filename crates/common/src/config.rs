//! Outbound HTTP request options.
//!
//! [`FetchOptions`] is the one place that says how the bridge talks to other
//! origins: extra headers, cross-origin mode, when credentials travel, and
//! the per-request timeout. Every outbound call (key-set fetch, session
//! lookup, token issuance, propagation, authorized fetches) is built from it.

use reqwest::{Client, RequestBuilder, Url};
use std::time::Duration;
use thiserror::Error;

/// Default per-request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether requests may leave the home origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Cross-origin requests are allowed.
    #[default]
    Cors,
    /// Only requests to the home origin are allowed.
    SameOrigin,
    /// Cross-origin requests are allowed but carry no custom headers.
    NoCors,
}

/// When credentials (bearer tokens, cookies) are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    /// Never. The client keeps no cookie store.
    Omit,
    /// Only for requests to the home origin.
    #[default]
    SameOrigin,
    /// For every request.
    Include,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Cross-origin request to {0} blocked by same-origin mode")]
    CrossOriginBlocked(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Explicit options for outbound requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Extra headers added to every request (dropped in `NoCors` mode for
    /// cross-origin targets).
    pub headers: Vec<(String, String)>,
    pub mode: RequestMode,
    pub credentials: CredentialsMode,
    /// Bound on each request, connect through body.
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            mode: RequestMode::default(),
            credentials: CredentialsMode::default(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Two URLs share an origin when scheme, host and port all match.
#[must_use]
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

impl FetchOptions {
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialsMode) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a `reqwest::Client` honoring the timeout and credentials mode.
    ///
    /// A cookie store is enabled unless credentials are omitted, so cookies
    /// minted by one response ride along on later requests.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::ClientBuild` if the TLS backend fails to initialize.
    pub fn build_client(&self) -> Result<Client, FetchError> {
        Client::builder()
            .timeout(self.timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(self.timeout))
            .cookie_store(self.credentials != CredentialsMode::Omit)
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))
    }

    /// Check that a request from `home` to `target` is allowed by the mode.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::CrossOriginBlocked` in same-origin mode when the
    /// origins differ.
    pub fn check_target(&self, home: &Url, target: &Url) -> Result<(), FetchError> {
        if self.mode == RequestMode::SameOrigin && !same_origin(home, target) {
            tracing::debug!(
                target: "common.fetch",
                target_origin = %target.origin().ascii_serialization(),
                "Blocked cross-origin request"
            );
            return Err(FetchError::CrossOriginBlocked(
                target.origin().ascii_serialization(),
            ));
        }
        Ok(())
    }

    /// Whether credentials should accompany a request from `home` to `target`.
    #[must_use]
    pub fn sends_credentials(&self, home: &Url, target: &Url) -> bool {
        match self.credentials {
            CredentialsMode::Omit => false,
            CredentialsMode::SameOrigin => same_origin(home, target),
            CredentialsMode::Include => true,
        }
    }

    /// Add the configured headers to a request.
    #[must_use]
    pub fn apply_headers(&self, home: &Url, target: &Url, mut builder: RequestBuilder) -> RequestBuilder {
        if self.mode == RequestMode::NoCors && !same_origin(home, target) {
            return builder;
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}
