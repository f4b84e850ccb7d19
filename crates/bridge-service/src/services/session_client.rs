//! Session lookup against the identity provider.
//!
//! Exchanges an already-verified bridge token for the live session and user
//! by calling `GET {issuer}/auth/get-session` with the token as a bearer
//! credential.
//!
//! Tokens are not invalidated when a session is revoked. A revoked session
//! keeps passing token verification until the token expires; only this
//! lookup sees the revocation.

use crate::models::SessionData;
use crate::observability::metrics::record_session_lookup;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use std::time::Instant;
use thiserror::Error;
use tracing::{instrument, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The identity provider has no live session for this token.
    #[error("Session not found")]
    NotFound,

    /// Transport failure, timeout, 5xx, or an unreadable response.
    #[error("Session lookup unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a verified token to its live session.
#[async_trait]
pub trait SessionLookup: Send + Sync {
    async fn resolve(&self, token: &SecretString) -> Result<SessionData, SessionError>;
}

/// HTTP session lookup against the identity provider.
pub struct IdpSessionClient {
    session_url: String,
    http_client: reqwest::Client,
}

impl IdpSessionClient {
    #[must_use]
    pub fn new(session_url: String, http_client: reqwest::Client) -> Self {
        Self {
            session_url,
            http_client,
        }
    }

    async fn lookup(&self, token: &SecretString) -> Result<SessionData, SessionError> {
        let response = self
            .http_client
            .get(&self.session_url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "bridge.services.session", error = %e, "Session lookup request failed");
                SessionError::Unavailable("Session lookup request failed".to_string())
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 404 {
            return Err(SessionError::NotFound);
        }
        if !status.is_success() {
            warn!(target: "bridge.services.session", status = %status, "Identity provider returned error");
            return Err(SessionError::Unavailable(format!(
                "Identity provider returned {}",
                status.as_u16()
            )));
        }

        let body: Option<SessionData> = response.json().await.map_err(|e| {
            warn!(target: "bridge.services.session", error = %e, "Failed to parse session response");
            SessionError::Unavailable("Session response was malformed".to_string())
        })?;

        body.ok_or(SessionError::NotFound)
    }
}

#[async_trait]
impl SessionLookup for IdpSessionClient {
    #[instrument(skip_all)]
    async fn resolve(&self, token: &SecretString) -> Result<SessionData, SessionError> {
        let start = Instant::now();
        let result = self.lookup(token).await;
        let status = match &result {
            Ok(_) => "found",
            Err(SessionError::NotFound) => "not_found",
            Err(SessionError::Unavailable(_)) => "error",
        };
        record_session_lookup(status, start.elapsed());
        result
    }
}
