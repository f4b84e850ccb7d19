//! Key sources for token verification.
//!
//! - [`RemoteKeySource`] fetches `{issuer}/auth/jwks` once and keeps the
//!   result for the life of the process. Concurrent first callers share one
//!   fetch; a failed fetch is not remembered, so the next caller retries.
//! - [`LocalKeySource`] holds a key set provided at startup and never touches
//!   the network.
//!
//! Neither source refreshes proactively. Key rotation at the identity
//! provider is expected to be additive.

use crate::auth::jwks::{JwkError, JwksResponse, KeySet};
use crate::observability::metrics::record_jwks_fetch;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::instrument;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeySourceError {
    /// The key set could not be fetched or parsed.
    #[error("Key set unavailable: {0}")]
    Unavailable(String),

    /// Locally provided key material is invalid.
    #[error("Invalid key set: {0}")]
    Invalid(#[from] JwkError),
}

/// Resolves the key set a verifier trusts.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn keys(&self) -> Result<Arc<KeySet>, KeySourceError>;

    /// Short label for readiness reporting.
    fn status(&self) -> &'static str {
        "unknown"
    }
}

/// Key set fetched from the identity provider and memoized.
pub struct RemoteKeySource {
    jwks_url: String,
    http_client: reqwest::Client,
    cached: OnceCell<Arc<KeySet>>,
}

impl RemoteKeySource {
    /// Create a remote key source.
    ///
    /// The client carries the outbound timeout; nothing is fetched until the
    /// first call to [`KeySource::keys`].
    #[must_use]
    pub fn new(jwks_url: String, http_client: reqwest::Client) -> Self {
        Self {
            jwks_url,
            http_client,
            cached: OnceCell::new(),
        }
    }

    /// Whether a key set has been fetched and memoized.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.cached.initialized()
    }

    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<Arc<KeySet>, KeySourceError> {
        let start = Instant::now();
        let result = self.fetch_inner().await;
        record_jwks_fetch(
            if result.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );
        result
    }

    async fn fetch_inner(&self) -> Result<Arc<KeySet>, KeySourceError> {
        tracing::debug!(target: "bridge.auth.jwks", url = %self.jwks_url, "Fetching JWKS from identity provider");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "bridge.auth.jwks", error = %e, "Failed to fetch JWKS");
                KeySourceError::Unavailable("Key set fetch failed".to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "bridge.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(KeySourceError::Unavailable(format!(
                "Key set endpoint returned {}",
                response.status().as_u16()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "bridge.auth.jwks", error = %e, "Failed to parse JWKS response");
            KeySourceError::Unavailable("Key set response was malformed".to_string())
        })?;

        let key_set = KeySet::from_jwks(&jwks.keys).map_err(|e| {
            tracing::error!(target: "bridge.auth.jwks", error = %e, "JWKS contained no usable keys");
            KeySourceError::Unavailable(e.to_string())
        })?;

        tracing::info!(
            target: "bridge.auth.jwks",
            key_count = key_set.len(),
            "JWKS fetched and cached for process lifetime"
        );

        Ok(Arc::new(key_set))
    }
}

#[async_trait]
impl KeySource for RemoteKeySource {
    async fn keys(&self) -> Result<Arc<KeySet>, KeySourceError> {
        self.cached
            .get_or_try_init(|| self.fetch())
            .await
            .map(Arc::clone)
    }

    fn status(&self) -> &'static str {
        if self.is_resolved() {
            "resolved"
        } else {
            "unresolved"
        }
    }
}

/// Key set provided through configuration.
#[derive(Debug, Clone)]
pub struct LocalKeySource {
    keys: Arc<KeySet>,
}

impl LocalKeySource {
    /// Parse a JWKS document or a single JWK.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::Invalid` for malformed or unusable key material.
    pub fn from_json(json: &str) -> Result<Self, KeySourceError> {
        let keys = KeySet::parse(json)?;
        tracing::info!(
            target: "bridge.auth.jwks",
            key_count = keys.len(),
            "Loaded local key set"
        );
        Ok(Self {
            keys: Arc::new(keys),
        })
    }
}

#[async_trait]
impl KeySource for LocalKeySource {
    async fn keys(&self) -> Result<Arc<KeySet>, KeySourceError> {
        Ok(Arc::clone(&self.keys))
    }

    fn status(&self) -> &'static str {
        "local"
    }
}
