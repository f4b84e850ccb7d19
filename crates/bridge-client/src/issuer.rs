//! Token issuance at the identity provider.
//!
//! `GET {auth_server}/auth/token` answers `{ "token": "<jwt>" }` for a
//! signed-in session. The session credential travels the way the
//! configured [`FetchOptions`] say: the shared cookie store, or extra
//! headers such as a forwarded `Cookie`.

use crate::errors::ClientError;
use async_trait::async_trait;
use common::config::FetchOptions;
use reqwest::Url;
use common::secret::SecretString;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

/// Requests fresh tokens from the identity provider.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self) -> Result<SecretString, ClientError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// HTTP token issuer against the IdP.
pub struct HttpTokenIssuer {
    token_url: Url,
    http_client: reqwest::Client,
    options: FetchOptions,
}

impl HttpTokenIssuer {
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if `token_url` is not a valid URL.
    pub fn new(
        token_url: &str,
        http_client: reqwest::Client,
        options: FetchOptions,
    ) -> Result<Self, ClientError> {
        let token_url = Url::parse(token_url)
            .map_err(|e| ClientError::Configuration(format!("Invalid token URL: {e}")))?;
        Ok(Self {
            token_url,
            http_client,
            options,
        })
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    #[instrument(skip_all)]
    async fn issue(&self) -> Result<SecretString, ClientError> {
        debug!(target: "bridge.client.issuer", url = %self.token_url, "Requesting token from IdP");

        let request = self.options.apply_headers(
            &self.token_url,
            &self.token_url,
            self.http_client.get(self.token_url.clone()),
        );

        let response = request.send().await.map_err(|e| {
            debug!(target: "bridge.client.issuer", error = %e, "Token request failed");
            ClientError::Http(e.to_string())
        })?;

        let status = response.status();
        if status.as_u16() == 401 {
            debug!(target: "bridge.client.issuer", "IdP reports no authenticated session");
            return Err(ClientError::NoToken);
        }
        if !status.is_success() {
            warn!(target: "bridge.client.issuer", status = %status, "IdP rejected token request");
            return Err(ClientError::HttpStatus(status.as_u16()));
        }

        let body: Option<TokenResponse> = response.json().await.map_err(|e| {
            warn!(target: "bridge.client.issuer", error = %e, "Failed to parse token response");
            ClientError::InvalidResponse(e.to_string())
        })?;

        match body.and_then(|b| b.token).filter(|t| !t.is_empty()) {
            Some(token) => Ok(SecretString::from(token)),
            None => Err(ClientError::NoToken),
        }
    }
}
