//! Session lifecycle driver.
//!
//! [`TokenBridge`] joins the token cache and the propagator: a newly
//! authenticated subject gets a token pushed to every service, and sign-out
//! or teardown clears them again.

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::fetcher::AuthorizedClient;
use crate::issuer::{HttpTokenIssuer, TokenIssuer};
use crate::propagator::{PropagationReport, Propagator};
use crate::token_cache::TokenCache;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Authentication state reported by the IdP session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    SignedOut,
    Authenticated { subject: String },
}

/// Client-side token bridge.
#[derive(Debug)]
pub struct TokenBridge {
    cache: Arc<TokenCache>,
    propagator: Propagator,
    fetcher: AuthorizedClient,
    /// Subject whose token was last registered with the services.
    last_subject: Mutex<Option<String>>,
}

impl TokenBridge {
    #[must_use]
    pub fn new(cache: Arc<TokenCache>, propagator: Propagator, fetcher: AuthorizedClient) -> Self {
        Self {
            cache,
            propagator,
            fetcher,
            last_subject: Mutex::new(None),
        }
    }

    /// Wire up the bridge from configuration.
    ///
    /// One cookie-store HTTP client is shared by token issuance, propagation
    /// and authorized fetches.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if an HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let http_client = config.fetch.build_client()?;

        let issuer: Arc<dyn TokenIssuer> = Arc::new(HttpTokenIssuer::new(
            &config.token_url(),
            http_client.clone(),
            config.fetch.clone(),
        )?);

        let cache = Arc::new(
            TokenCache::new(issuer)
                .with_early_refresh_factor(config.early_refresh_factor)
                .with_acquire_timeout(config.acquire_timeout),
        );

        let propagator = Propagator::new(
            config.services.clone(),
            http_client.clone(),
            config.fetch.clone(),
            config.auth_server.clone(),
        )
        .with_register_policy(config.register_policy)
        .with_clear_policy(config.clear_policy);

        let fetcher = AuthorizedClient::new(
            Arc::clone(&cache),
            http_client,
            config.fetch.clone(),
            config.auth_server.clone(),
            config.auth_server.clone(),
        )?;

        Ok(Self::new(cache, propagator, fetcher))
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    #[must_use]
    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    #[must_use]
    pub fn fetcher(&self) -> &AuthorizedClient {
        &self.fetcher
    }

    /// The cookie-store client shared by propagation and fetches.
    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        self.propagator.http_client()
    }

    /// React to a session change.
    ///
    /// Returns the propagation report when services were contacted, or
    /// `None` when nothing needed doing or no token could be acquired.
    #[instrument(skip_all)]
    pub async fn on_session(&self, state: SessionState) -> Option<PropagationReport> {
        match state {
            SessionState::Authenticated { subject } => self.register_subject(subject).await,
            SessionState::SignedOut => Some(self.sign_out().await),
        }
    }

    async fn register_subject(&self, subject: String) -> Option<PropagationReport> {
        let mut last_subject = self.last_subject.lock().await;
        if last_subject.as_deref() == Some(subject.as_str()) {
            debug!(target: "bridge.client", "Subject unchanged, skipping registration");
            return None;
        }

        if last_subject.is_some() {
            // Cached token belongs to the previous subject.
            self.cache.invalidate();
        }

        let token = match self.cache.acquire().await {
            Ok(token) => token,
            Err(e) => {
                warn!(target: "bridge.client", error = %e, "Could not acquire token for new session");
                return None;
            }
        };

        let report = self.propagator.register(&token).await;
        info!(
            target: "bridge.client",
            registered = report.succeeded().count(),
            services = report.outcomes.len(),
            "Registered token for new session"
        );
        *last_subject = Some(subject);
        Some(report)
    }

    async fn sign_out(&self) -> PropagationReport {
        let mut last_subject = self.last_subject.lock().await;
        self.cache.invalidate();
        *last_subject = None;
        self.propagator.clear().await
    }

    /// Drop the cached token and clear every service.
    pub async fn shutdown(&self) -> PropagationReport {
        info!(target: "bridge.client", "Shutting down token bridge");
        self.sign_out().await
    }
}

/// Drive `bridge` from a session channel until the sender is dropped, then
/// shut it down.
pub fn spawn_session_watcher(
    bridge: Arc<TokenBridge>,
    mut sessions: watch::Receiver<SessionState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let initial = sessions.borrow_and_update().clone();
        if initial != SessionState::SignedOut {
            bridge.on_session(initial).await;
        }

        while sessions.changed().await.is_ok() {
            let state = sessions.borrow_and_update().clone();
            bridge.on_session(state).await;
        }

        debug!(target: "bridge.client", "Session channel closed");
        bridge.shutdown().await;
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::config::FetchOptions;
    use reqwest::Url;
    use common::secret::SecretString;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct SequenceIssuer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TokenIssuer for SequenceIssuer {
        async fn issue(&self) -> Result<SecretString, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SecretString::from(format!("token-{n}")))
        }
    }

    async fn service() -> MockServer {
        let server = MockServer::start().await;
        for verb in ["GET", "DELETE"] {
            Mock::given(method(verb))
                .and(path("/auth/token"))
                .respond_with(ResponseTemplate::new(200))
                .mount(&server)
                .await;
        }
        server
    }

    fn bridge(server: &MockServer) -> (TokenBridge, Arc<SequenceIssuer>) {
        let issuer = Arc::new(SequenceIssuer {
            calls: AtomicU32::new(0),
        });
        let cache = Arc::new(TokenCache::new(Arc::clone(&issuer) as Arc<dyn TokenIssuer>));
        let options = FetchOptions::default().with_timeout(Duration::from_millis(500));
        let http = options.build_client().unwrap();
        let home = Url::parse("http://idp.localhost").unwrap();
        let propagator = Propagator::new(
            vec![Url::parse(&server.uri()).unwrap()],
            http.clone(),
            options.clone(),
            home.clone(),
        );
        let fetcher =
            AuthorizedClient::new(Arc::clone(&cache), http, options, home.clone(), home).unwrap();
        (TokenBridge::new(cache, propagator, fetcher), issuer)
    }

    async fn requests(server: &MockServer, verb: &str) -> usize {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == verb)
            .count()
    }

    fn authenticated(subject: &str) -> SessionState {
        SessionState::Authenticated {
            subject: subject.to_string(),
        }
    }

    #[tokio::test]
    async fn test_same_subject_registers_once() {
        let server = service().await;
        let (bridge, issuer) = bridge(&server);

        assert!(bridge.on_session(authenticated("u1")).await.is_some());
        assert!(bridge.on_session(authenticated("u1")).await.is_none());

        assert_eq!(requests(&server, "GET").await, 1);
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_subject_gets_new_token() {
        let server = service().await;
        let (bridge, issuer) = bridge(&server);

        bridge.on_session(authenticated("u1")).await;
        bridge.on_session(authenticated("u2")).await;

        assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);
        let auths: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter_map(|r| r.headers.get("authorization"))
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(auths, vec!["Bearer token-1", "Bearer token-2"]);
    }

    #[tokio::test]
    async fn test_sign_out_invalidates_and_clears() {
        let server = service().await;
        let (bridge, _) = bridge(&server);

        bridge.on_session(authenticated("u1")).await;
        assert!(bridge.cache().refresh_at().is_some());

        let report = bridge.on_session(SessionState::SignedOut).await.unwrap();
        assert!(report.all_succeeded());
        assert!(bridge.cache().refresh_at().is_none());
        assert_eq!(requests(&server, "DELETE").await, 1);

        // Signing back in as the same subject registers again.
        assert!(bridge.on_session(authenticated("u1")).await.is_some());
    }

    #[tokio::test]
    async fn test_watcher_clears_when_sender_dropped() {
        let server = service().await;
        let (bridge, _) = bridge(&server);
        let bridge = Arc::new(bridge);

        let (tx, rx) = watch::channel(SessionState::SignedOut);
        let handle = spawn_session_watcher(Arc::clone(&bridge), rx);

        tx.send(authenticated("u1")).unwrap();
        while requests(&server, "GET").await == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        drop(tx);
        handle.await.unwrap();

        assert_eq!(requests(&server, "DELETE").await, 1);
        assert!(bridge.cache().refresh_at().is_none());
    }
}
