//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating signed bridge tokens.

use crate::crypto_fixtures::TestKeypair;
use chrono::Utc;
use serde_json::{json, Map, Value};

/// Default token lifetime in seconds (15 minutes).
pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 900;

/// Subject and user id of the default embedded user.
pub const TEST_USER_ID: &str = "user-123";

/// The user snapshot embedded in tokens by default.
pub fn test_user() -> Value {
    json!({
        "id": TEST_USER_ID,
        "email": "ada@example.com",
        "name": "Ada Lovelace",
        "emailVerified": true,
    })
}

/// Builder for signed bridge tokens
///
/// # Example
/// ```rust,ignore
/// let token = TokenBuilder::new("https://idp.example.com", "https://svc-a.example.com")
///     .signed_by(&keypair)
///     .expires_at(now + 60)
///     .sign();
/// ```
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    iss: String,
    aud: Value,
    iat: i64,
    exp: Option<i64>,
    sub: Option<String>,
    user: Option<Value>,
    extra: Map<String, Value>,
    keypair: Option<TestKeypair>,
    include_kid: bool,
}

impl TokenBuilder {
    /// Create a builder for `issuer` and a single `audience`, issued now
    /// and valid for [`DEFAULT_TOKEN_TTL_SECONDS`].
    pub fn new(issuer: &str, audience: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            iss: issuer.to_string(),
            aud: Value::from(audience),
            iat: now,
            exp: Some(now + DEFAULT_TOKEN_TTL_SECONDS),
            sub: Some(TEST_USER_ID.to_string()),
            user: Some(test_user()),
            extra: Map::new(),
            keypair: None,
            include_kid: true,
        }
    }

    pub fn issuer(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    pub fn audience(mut self, audience: &str) -> Self {
        self.aud = Value::from(audience);
        self
    }

    /// Use an array `aud` claim.
    pub fn audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = Value::from(audiences.to_vec());
        self
    }

    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = Some(timestamp);
        self
    }

    /// Set expiration relative to `iat`.
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some(self.iat + seconds);
        self
    }

    pub fn without_exp(mut self) -> Self {
        self.exp = None;
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.sub = Some(subject.to_string());
        self
    }

    pub fn without_subject(mut self) -> Self {
        self.sub = None;
        self
    }

    /// Replace the embedded user snapshot.
    pub fn user(mut self, user: Value) -> Self {
        self.user = Some(user);
        self
    }

    pub fn without_user(mut self) -> Self {
        self.user = None;
        self
    }

    /// Add an arbitrary claim.
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    pub fn signed_by(mut self, keypair: &TestKeypair) -> Self {
        self.keypair = Some(keypair.clone());
        self
    }

    /// Omit `kid` from the token header.
    pub fn without_kid(mut self) -> Self {
        self.include_kid = false;
        self
    }

    /// Build the claims as a JSON value.
    pub fn claims(&self) -> Value {
        let mut claims = self.extra.clone();
        claims.insert("iss".to_string(), Value::from(self.iss.clone()));
        claims.insert("aud".to_string(), self.aud.clone());
        claims.insert("iat".to_string(), Value::from(self.iat));
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), Value::from(exp));
        }
        if let Some(sub) = &self.sub {
            claims.insert("sub".to_string(), Value::from(sub.clone()));
        }
        if let Some(user) = &self.user {
            claims.insert("user".to_string(), user.clone());
        }
        Value::Object(claims)
    }

    /// Sign with the configured keypair, or `TestKeypair::new(1, "test-key")`.
    pub fn sign(&self) -> String {
        let default_keypair;
        let keypair = match &self.keypair {
            Some(keypair) => keypair,
            None => {
                default_keypair = TestKeypair::new(1, "test-key");
                &default_keypair
            }
        };

        let kid = self.include_kid.then(|| keypair.kid());
        keypair.sign_with_header(&self.claims(), kid)
    }
}
