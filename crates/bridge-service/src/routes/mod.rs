//! HTTP routes for the bridge service.
//!
//! Defines the Axum router and application state.

use crate::auth::{KeySource, LocalKeySource, RemoteKeySource, SessionCookie, Verifier};
use crate::config::{Config, ConfigError};
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth};
use crate::services::{IdpSessionClient, SessionLookup};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use common::config::FetchOptions;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Token verifier bound to the trusted issuer.
    pub verifier: Arc<Verifier>,

    /// Session cookie settings.
    pub cookie: SessionCookie,

    /// Live session lookup at the identity provider.
    pub sessions: Arc<dyn SessionLookup>,

    /// Set once shutdown begins; readiness reports 503 from then on.
    pub draining: Arc<AtomicBool>,
}

impl AppState {
    /// Build state from configuration.
    ///
    /// Uses the configured local key set when present, else the identity
    /// provider's JWKS endpoint. Nothing is fetched here.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidJwks` for unusable local key material and
    /// `ConfigError::HttpClient` if the outbound client cannot be built.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let http_client = FetchOptions::default()
            .with_timeout(config.http_timeout)
            .build_client()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let key_source: Arc<dyn KeySource> = match &config.auth_server_jwks {
            Some(json) => Arc::new(
                LocalKeySource::from_json(json)
                    .map_err(|e| ConfigError::InvalidJwks(e.to_string()))?,
            ),
            None => Arc::new(RemoteKeySource::new(config.jwks_url(), http_client.clone())),
        };

        let verifier =
            Verifier::new(key_source, config.auth_server.clone()).with_leeway(config.leeway());
        let sessions = IdpSessionClient::new(config.session_url(), http_client);
        let cookie = SessionCookie::new(config.cookie_name.clone(), config.cookie_max_age_seconds);

        Ok(Self {
            config,
            verifier: Arc::new(verifier),
            cookie,
            sessions: Arc::new(sessions),
            draining: Arc::new(AtomicBool::new(false)),
        })
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(target: "bridge.routes", origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK") - public
/// - `/ready` - Readiness probe (key set resolvable) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/auth/token` - GET binds a verified bearer token to a cookie, DELETE clears it
/// - `/api/protected` - Sample protected resource - requires authentication
/// - `/api/session` - Live session lookup - requires authentication
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
/// - Credentialed CORS when origins are configured
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route(
            "/auth/token",
            get(handlers::accept_token).delete(handlers::clear_token),
        )
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/api/protected", get(handlers::get_protected))
        .route("/api/session", get(handlers::get_session))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. CorsLayer - Answer preflights before they reach routing
    // 4. http_metrics_middleware - Record ALL responses (outermost)
    let mut router = public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    if let Some(cors) = cors_layer(&state.config.cors_origins) {
        router = router.layer(cors);
    }

    router.layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(extra: &[(&str, &str)]) -> Config {
        let mut vars = HashMap::from([(
            "AUTH_SERVER".to_string(),
            "http://localhost:3000".to_string(),
        )]);
        for (k, v) in extra {
            vars.insert((*k).to_string(), (*v).to_string());
        }
        Config::from_vars(&vars).unwrap()
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_from_config_remote_keys() {
        let state = AppState::from_config(config_with(&[])).unwrap();
        assert_eq!(state.verifier.key_status(), "unresolved");
        assert_eq!(state.verifier.issuer(), "http://localhost:3000");
    }

    #[test]
    fn test_from_config_local_keys() {
        let jwk = r#"{"kty":"OKP","crv":"Ed25519","kid":"k1","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}"#;
        let state = AppState::from_config(config_with(&[("AUTH_SERVER_JWKS", jwk)])).unwrap();
        assert_eq!(state.verifier.key_status(), "local");
    }

    #[test]
    fn test_from_config_rejects_unusable_local_keys() {
        let result = AppState::from_config(config_with(&[("AUTH_SERVER_JWKS", r#"{"keys":[]}"#)]));
        assert!(matches!(result, Err(ConfigError::InvalidJwks(_))));
    }

    #[test]
    fn test_cors_layer_only_with_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["https://app.example.com".to_string()]).is_some());
    }
}
