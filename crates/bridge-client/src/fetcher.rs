//! Authorized JSON fetches against dependent services.

use crate::errors::ClientError;
use crate::token_cache::TokenCache;
use common::config::FetchOptions;
use reqwest::Url;
use common::secret::ExposeSecret;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument};

/// HTTP client that attaches a cached bridge token to service requests.
///
/// Requests under the IdP base URL go out as-is and rely on the IdP's own
/// session. Every other request acquires a token from the shared
/// [`TokenCache`] and sends it as `Authorization: Bearer`. Cookies are only
/// carried when the credentials mode allows it for the target.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    cache: Arc<TokenCache>,
    credentialed: reqwest::Client,
    anonymous: reqwest::Client,
    options: FetchOptions,
    home: Url,
    idp_base: Url,
}

impl AuthorizedClient {
    /// `credentialed` should be the cookie-store client shared with the
    /// propagator.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the cookie-less client cannot be built.
    pub fn new(
        cache: Arc<TokenCache>,
        credentialed: reqwest::Client,
        options: FetchOptions,
        home: Url,
        idp_base: Url,
    ) -> Result<Self, ClientError> {
        let anonymous = options
            .clone()
            .with_credentials(common::config::CredentialsMode::Omit)
            .build_client()?;
        Ok(Self {
            cache,
            credentialed,
            anonymous,
            options,
            home,
            idp_base,
        })
    }

    fn is_idp_url(&self, url: &Url) -> bool {
        url.origin() == self.idp_base.origin() && url.path().starts_with(self.idp_base.path())
    }

    /// `GET url` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// - `ClientError::Blocked` when the request mode forbids the target
    /// - any token acquisition error for service URLs
    /// - `ClientError::HttpStatus` for non-2xx responses
    /// - `ClientError::InvalidResponse` when the body does not decode as `T`
    #[instrument(skip_all, fields(url = %url))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let url = Url::parse(url)
            .map_err(|e| ClientError::Configuration(format!("Invalid URL: {e}")))?;
        self.options.check_target(&self.home, &url)?;

        let client = if self.options.sends_credentials(&self.home, &url) {
            &self.credentialed
        } else {
            &self.anonymous
        };

        let mut request = self
            .options
            .apply_headers(&self.home, &url, client.get(url.clone()));

        if !self.is_idp_url(&url) {
            let token = self.cache.acquire().await?;
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            debug!(target: "bridge.client.fetch", error = %e, "Request failed");
            ClientError::Http(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            debug!(target: "bridge.client.fetch", status = %status, "Non-success response");
            return Err(ClientError::HttpStatus(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::issuer::TokenIssuer;
    use async_trait::async_trait;
    use common::config::RequestMode;
    use common::secret::SecretString;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedIssuer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TokenIssuer for FixedIssuer {
        async fn issue(&self) -> Result<SecretString, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SecretString::from("fixed.token.value"))
        }
    }

    fn client(idp: &str, options: FetchOptions) -> (AuthorizedClient, Arc<FixedIssuer>) {
        let issuer = Arc::new(FixedIssuer {
            calls: AtomicU32::new(0),
        });
        let cache = Arc::new(TokenCache::new(Arc::clone(&issuer) as Arc<dyn TokenIssuer>));
        let credentialed = options.build_client().unwrap();
        let idp = Url::parse(idp).unwrap();
        let client =
            AuthorizedClient::new(cache, credentialed, options, idp.clone(), idp).unwrap();
        (client, issuer)
    }

    #[tokio::test]
    async fn test_service_request_carries_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/protected"))
            .and(header("Authorization", "Bearer fixed.token.value"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": 42})))
            .expect(2)
            .mount(&server)
            .await;

        let (client, issuer) = client("http://idp.localhost", FetchOptions::default());
        let url = format!("{}/api/protected", server.uri());

        let body: serde_json::Value = client.get_json(&url).await.unwrap();
        assert_eq!(body["message"], 42);
        let _: serde_json::Value = client.get_json(&url).await.unwrap();

        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_idp_request_has_no_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/get-session"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let (client, issuer) = client(&server.uri(), FetchOptions::default());
        let body: Option<serde_json::Value> = client
            .get_json(&format!("{}/auth/get-session", server.uri()))
            .await
            .unwrap();

        assert!(body.is_none());
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 0);
        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_non_2xx_is_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (client, _) = client("http://idp.localhost", FetchOptions::default());
        let err = client
            .get_json::<serde_json::Value>(&format!("{}/api/protected", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::HttpStatus(401));
    }

    #[tokio::test]
    async fn test_same_origin_mode_blocks_before_acquiring() {
        let (client, issuer) = client(
            "http://idp.localhost",
            FetchOptions::default().with_mode(RequestMode::SameOrigin),
        );
        let err = client
            .get_json::<serde_json::Value>("http://svc.localhost/api/protected")
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Blocked(_)));
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 0);
    }
}
