//! Token verification.
//!
//! Validates presented tokens against the trusted key set, issuer, and an
//! audience supplied per call.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - HMAC algorithms are never accepted
//! - Issuer and audience are compared exactly, with no normalization
//! - Expiry is checked against the local clock; leeway is opt-in and bounded
//! - Every failure reaches HTTP callers as the same opaque 401

use crate::auth::jwks::KeyFamily;
use crate::auth::key_source::KeySource;
use crate::observability::metrics::record_token_verification;
use chrono::{DateTime, Utc};
use common::clock::{Clock, SystemClock};
use common::jwt::{peek_header, JwtError};
use common::types::TokenClaims;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Why a token was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Token is malformed")]
    MalformedToken,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token issuer does not match")]
    IssuerMismatch,

    #[error("Token audience does not match")]
    AudienceMismatch,

    #[error("Token has expired")]
    Expired,

    #[error("Signing keys unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl VerifyError {
    /// Bounded label for metrics.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            VerifyError::MalformedToken => "malformed",
            VerifyError::InvalidSignature => "invalid_signature",
            VerifyError::IssuerMismatch => "issuer_mismatch",
            VerifyError::AudienceMismatch => "audience_mismatch",
            VerifyError::Expired => "expired",
            VerifyError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

impl From<JwtError> for VerifyError {
    fn from(_: JwtError) -> Self {
        VerifyError::MalformedToken
    }
}

/// Errors that mean "this key did not verify the token", as opposed to a
/// problem with the token itself.
fn is_key_mismatch(kind: &ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidRsaKey(_)
    )
}

/// Verifies bridge tokens.
pub struct Verifier {
    key_source: Arc<dyn KeySource>,
    issuer: String,
    leeway: Duration,
    clock: Arc<dyn Clock>,
}

impl Verifier {
    /// Create a verifier trusting `issuer` with keys from `key_source`.
    #[must_use]
    pub fn new(key_source: Arc<dyn KeySource>, issuer: impl Into<String>) -> Self {
        Self {
            key_source,
            issuer: issuer.into(),
            leeway: Duration::ZERO,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Key set state for readiness reporting.
    #[must_use]
    pub fn key_status(&self) -> &'static str {
        self.key_source.status()
    }

    /// Whether the key set can be resolved right now.
    pub async fn is_ready(&self) -> bool {
        self.key_source.keys().await.is_ok()
    }

    /// Verify `token` for `audience` against the current time.
    ///
    /// # Errors
    ///
    /// Returns the `VerifyError` describing the first check that failed.
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str, audience: &str) -> Result<TokenClaims, VerifyError> {
        let now = self.clock.now();
        let result = self.verify_at(token, audience, now).await;
        match &result {
            Ok(_) => record_token_verification("success"),
            Err(e) => record_token_verification(e.outcome()),
        }
        result
    }

    /// Verify `token` for `audience` as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the `VerifyError` describing the first check that failed.
    pub async fn verify_at(
        &self,
        token: &str,
        audience: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, VerifyError> {
        // 1. Header (includes size check via common::jwt)
        let header = peek_header(token).map_err(|e| {
            tracing::debug!(target: "bridge.auth.verify", error = %e, "Token header rejected");
            VerifyError::from(e)
        })?;

        let alg = Algorithm::from_str(&header.alg).map_err(|_| {
            tracing::debug!(target: "bridge.auth.verify", alg = %header.alg, "Unknown token algorithm");
            VerifyError::MalformedToken
        })?;

        if KeyFamily::for_algorithm(alg).is_none() {
            tracing::warn!(target: "bridge.auth.verify", alg = ?alg, "Rejected token with symmetric algorithm");
            return Err(VerifyError::InvalidSignature);
        }

        // 2. Key set
        let keys = self.key_source.keys().await.map_err(|e| {
            tracing::warn!(target: "bridge.auth.verify", error = %e, "Key set unavailable");
            VerifyError::UpstreamUnavailable(e.to_string())
        })?;

        // 3. Signature against each candidate key
        let mut validation = Validation::new(alg);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let mut claims = None;
        for key in keys.candidates(header.kid.as_deref(), alg) {
            match decode::<TokenClaims>(token, &key.decoding_key, &validation) {
                Ok(data) => {
                    claims = Some(data.claims);
                    break;
                }
                Err(e) if is_key_mismatch(e.kind()) => {
                    tracing::trace!(target: "bridge.auth.verify", kid = ?key.kid, "Key did not verify token");
                }
                Err(e) => {
                    tracing::debug!(target: "bridge.auth.verify", error = %e, "Token structure rejected");
                    return Err(VerifyError::MalformedToken);
                }
            }
        }

        let Some(claims) = claims else {
            tracing::debug!(
                target: "bridge.auth.verify",
                kid = ?header.kid,
                "No trusted key verified the token signature"
            );
            return Err(VerifyError::InvalidSignature);
        };

        // 4. Issuer
        if claims.iss != self.issuer {
            tracing::debug!(target: "bridge.auth.verify", iss = %claims.iss, "Token issuer mismatch");
            return Err(VerifyError::IssuerMismatch);
        }

        // 5. Audience
        if !claims.aud.contains_exact(audience) {
            tracing::debug!(
                target: "bridge.auth.verify",
                expected = %audience,
                aud = ?claims.aud,
                "Token audience mismatch"
            );
            return Err(VerifyError::AudienceMismatch);
        }

        // 6. Expiry
        let leeway_secs = i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX);
        if now.timestamp() >= claims.exp.saturating_add(leeway_secs) {
            tracing::debug!(
                target: "bridge.auth.verify",
                exp = claims.exp,
                now = now.timestamp(),
                "Token expired"
            );
            return Err(VerifyError::Expired);
        }

        tracing::debug!(target: "bridge.auth.verify", "Token verified");
        Ok(claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::key_source::{KeySourceError, LocalKeySource};
    use crate::auth::jwks::KeySet;
    use async_trait::async_trait;
    use bridge_test_utils::crypto_fixtures::TestKeypair;
    use bridge_test_utils::token_builders::TokenBuilder;
    use common::jwt::MAX_JWT_SIZE_BYTES;

    const ISSUER: &str = "https://idp.example.com";
    const AUDIENCE: &str = "https://svc-a.example.com";
    const NOW: i64 = 1_700_000_000;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(NOW, 0).unwrap()
    }

    fn verifier_for(keypairs: &[&TestKeypair]) -> Verifier {
        let jwks = serde_json::json!({
            "keys": keypairs.iter().map(|k| k.jwk_json()).collect::<Vec<_>>()
        });
        let source = LocalKeySource::from_json(&jwks.to_string()).unwrap();
        Verifier::new(Arc::new(source), ISSUER)
    }

    fn token(keypair: &TestKeypair) -> TokenBuilder {
        TokenBuilder::new(ISSUER, AUDIENCE)
            .issued_at(NOW)
            .expires_at(NOW + 900)
            .signed_by(keypair)
    }

    struct UnavailableKeys;

    #[async_trait]
    impl KeySource for UnavailableKeys {
        async fn keys(&self) -> Result<Arc<KeySet>, KeySourceError> {
            Err(KeySourceError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_verify_round_trip() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]);

        let claims = verifier
            .verify_at(&token(&keypair).sign(), AUDIENCE, now())
            .await
            .unwrap();

        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp, NOW + 900);
        assert_eq!(claims.user.unwrap().id, "user-123");
    }

    #[tokio::test]
    async fn test_verify_rejects_other_issuer() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]);
        let jwt = token(&keypair).issuer("https://evil.example.com").sign();

        assert_eq!(
            verifier.verify_at(&jwt, AUDIENCE, now()).await.unwrap_err(),
            VerifyError::IssuerMismatch
        );
    }

    #[tokio::test]
    async fn test_verify_issuer_trailing_slash_is_significant() {
        let keypair = TestKeypair::new(1, "key-1");
        let jwks = serde_json::json!({ "keys": [keypair.jwk_json()] });
        let source = LocalKeySource::from_json(&jwks.to_string()).unwrap();
        let verifier = Verifier::new(Arc::new(source), format!("{ISSUER}/"));

        let with_slash = token(&keypair).issuer(&format!("{ISSUER}/")).sign();
        assert!(verifier.verify_at(&with_slash, AUDIENCE, now()).await.is_ok());

        let without_slash = token(&keypair).sign();
        assert_eq!(
            verifier.verify_at(&without_slash, AUDIENCE, now()).await.unwrap_err(),
            VerifyError::IssuerMismatch
        );
    }

    #[tokio::test]
    async fn test_verify_rejects_other_audience() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]);
        let jwt = token(&keypair).sign();

        assert_eq!(
            verifier
                .verify_at(&jwt, "https://svc-b.example.com", now())
                .await
                .unwrap_err(),
            VerifyError::AudienceMismatch
        );
        // No prefix or trailing-slash tolerance
        assert_eq!(
            verifier
                .verify_at(&jwt, "https://svc-a.example.com/", now())
                .await
                .unwrap_err(),
            VerifyError::AudienceMismatch
        );
    }

    #[tokio::test]
    async fn test_verify_accepts_audience_array_member() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]);
        let jwt = token(&keypair)
            .audiences(&["https://svc-b.example.com", AUDIENCE])
            .sign();

        assert!(verifier.verify_at(&jwt, AUDIENCE, now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_rejects_untrusted_key() {
        let trusted = TestKeypair::new(1, "key-1");
        let attacker = TestKeypair::new(2, "key-1");
        let verifier = verifier_for(&[&trusted]);

        assert_eq!(
            verifier
                .verify_at(&token(&attacker).sign(), AUDIENCE, now())
                .await
                .unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_verify_unknown_kid() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]);
        let other = TestKeypair::new(1, "rotated-key");

        assert_eq!(
            verifier
                .verify_at(&token(&other).sign(), AUDIENCE, now())
                .await
                .unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_verify_without_kid_tries_every_key() {
        let first = TestKeypair::new(1, "key-1");
        let second = TestKeypair::new(2, "key-2");
        let verifier = verifier_for(&[&first, &second]);
        let jwt = token(&second).without_kid().sign();

        assert!(verifier.verify_at(&jwt, AUDIENCE, now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_expiry_boundary() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]);
        let jwt = token(&keypair).sign();

        let just_before = DateTime::from_timestamp(NOW + 899, 0).unwrap();
        let at_expiry = DateTime::from_timestamp(NOW + 900, 0).unwrap();

        assert!(verifier.verify_at(&jwt, AUDIENCE, just_before).await.is_ok());
        assert_eq!(
            verifier.verify_at(&jwt, AUDIENCE, at_expiry).await.unwrap_err(),
            VerifyError::Expired
        );
    }

    #[tokio::test]
    async fn test_verify_leeway() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]).with_leeway(Duration::from_secs(60));
        let jwt = token(&keypair).sign();

        let within = DateTime::from_timestamp(NOW + 959, 0).unwrap();
        let beyond = DateTime::from_timestamp(NOW + 960, 0).unwrap();

        assert!(verifier.verify_at(&jwt, AUDIENCE, within).await.is_ok());
        assert_eq!(
            verifier.verify_at(&jwt, AUDIENCE, beyond).await.unwrap_err(),
            VerifyError::Expired
        );
    }

    #[tokio::test]
    async fn test_verify_uses_injected_clock() {
        let keypair = TestKeypair::new(1, "key-1");
        let clock = Arc::new(common::clock::ManualClock::at_unix(NOW));
        let verifier = verifier_for(&[&keypair]).with_clock(clock.clone());
        let jwt = token(&keypair).sign();

        assert!(verifier.verify(&jwt, AUDIENCE).await.is_ok());

        clock.advance(chrono::Duration::seconds(900));
        assert_eq!(
            verifier.verify(&jwt, AUDIENCE).await.unwrap_err(),
            VerifyError::Expired
        );
    }

    #[tokio::test]
    async fn test_verify_malformed_tokens() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]);

        for bad in ["", "abc", "a.b", "!!!.payload.sig"] {
            assert_eq!(
                verifier.verify_at(bad, AUDIENCE, now()).await.unwrap_err(),
                VerifyError::MalformedToken,
                "token {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_verify_rejects_oversized_token() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]);
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);

        assert_eq!(
            verifier.verify_at(&oversized, AUDIENCE, now()).await.unwrap_err(),
            VerifyError::MalformedToken
        );
    }

    #[tokio::test]
    async fn test_verify_rejects_token_without_exp() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]);
        let jwt = token(&keypair).without_exp().sign();

        assert_eq!(
            verifier.verify_at(&jwt, AUDIENCE, now()).await.unwrap_err(),
            VerifyError::MalformedToken
        );
    }

    #[tokio::test]
    async fn test_verify_rejects_tampered_payload() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]);
        let jwt = token(&keypair).sign();
        let forged_claims = token(&keypair).subject("admin").sign();

        // Swap in another token's payload under the original signature
        let parts: Vec<&str> = jwt.split('.').collect();
        let forged_parts: Vec<&str> = forged_claims.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

        assert_eq!(
            verifier.verify_at(&tampered, AUDIENCE, now()).await.unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_verify_rejects_hmac_algorithm() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = verifier_for(&[&keypair]);
        let jwt = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &token(&keypair).claims(),
            &jsonwebtoken::EncodingKey::from_secret(b"guessable"),
        )
        .unwrap();

        assert_eq!(
            verifier.verify_at(&jwt, AUDIENCE, now()).await.unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_verify_key_source_unavailable() {
        let keypair = TestKeypair::new(1, "key-1");
        let verifier = Verifier::new(Arc::new(UnavailableKeys), ISSUER);

        assert!(matches!(
            verifier.verify_at(&token(&keypair).sign(), AUDIENCE, now()).await,
            Err(VerifyError::UpstreamUnavailable(_))
        ));
        assert!(!verifier.is_ready().await);
    }

    #[test]
    fn test_outcome_labels_are_distinct() {
        let labels = [
            VerifyError::MalformedToken.outcome(),
            VerifyError::InvalidSignature.outcome(),
            VerifyError::IssuerMismatch.outcome(),
            VerifyError::AudienceMismatch.outcome(),
            VerifyError::Expired.outcome(),
            VerifyError::UpstreamUnavailable(String::new()).outcome(),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
