//! Wiremock-backed identity provider.
//!
//! Serves the three IdP endpoints the bridge consumes:
//! - `GET /auth/jwks` - the fixture key set
//! - `GET /auth/token` - token issuance
//! - `GET /auth/get-session` - live session lookup

use crate::crypto_fixtures::TestKeypair;
use crate::token_builders::{test_user, TEST_USER_ID};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const JWKS_PATH: &str = "/auth/jwks";
pub const TOKEN_PATH: &str = "/auth/token";
pub const SESSION_PATH: &str = "/auth/get-session";

/// A `{ session, user }` body for the default test user.
pub fn session_body(session_id: &str) -> Value {
    json!({
        "session": {
            "id": session_id,
            "userId": TEST_USER_ID,
            "expiresAt": "2099-01-01T00:00:00.000Z",
            "token": "opaque-session-token",
        },
        "user": test_user(),
    })
}

/// Mock identity provider.
///
/// # Example
/// ```rust,ignore
/// let idp = MockIdp::start(TestKeypair::new(1, "key-1")).await;
/// idp.mount_token("a.b.c").await;
/// ```
pub struct MockIdp {
    server: MockServer,
    keypair: TestKeypair,
}

impl MockIdp {
    /// Start the server and publish `keypair` at `/auth/jwks`.
    pub async fn start(keypair: TestKeypair) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(keypair.jwks_json()))
            .mount(&server)
            .await;

        Self { server, keypair }
    }

    /// Base URL; doubles as the token issuer.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn keypair(&self) -> &TestKeypair {
        &self.keypair
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Answer `/auth/token` with `{ "token": token }`.
    pub async fn mount_token(&self, token: &str) {
        self.mount_token_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
            .await;
    }

    /// Answer `/auth/token` with `{ "token": token }` after `delay`.
    pub async fn mount_slow_token(&self, token: &str, delay: Duration) {
        self.mount_token_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "token": token }))
                .set_delay(delay),
        )
        .await;
    }

    /// Answer `/auth/token` with an arbitrary response.
    pub async fn mount_token_with(&self, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    /// Answer `/auth/get-session` with `body`.
    pub async fn mount_session(&self, body: Value) {
        Mock::given(method("GET"))
            .and(path(SESSION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Drop every mock, including the key set.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of requests received on `request_path`.
    pub async fn requests_to(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}
