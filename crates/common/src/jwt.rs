//! JWT utilities shared by the token bridge service and client.
//!
//! This module provides the pieces of JWT handling that do not need a key:
//! - Size limits for DoS prevention
//! - Leeway bounds for expiry checks
//! - Unverified header peeking (to select candidate keys by `kid`/`alg`)
//! - Unverified claim peeking (the client reads `exp` to schedule refresh)
//! - base64url key component decoding
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Nothing returned by [`peek_header`] or [`peek_claims`] is trusted; the
//!   service always verifies the signature before acting on claims
//! - Error messages are generic; detail is logged at debug level

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens issued by the identity provider embed a user snapshot and are
/// typically under 1KB. Anything above this limit is rejected before base64
/// decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default expiry leeway. Expiry is checked against the local clock exactly.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(0);

/// Maximum configurable expiry leeway (10 minutes).
pub const MAX_LEEWAY: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while peeking into a JWT.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("Token is too large")]
    TokenTooLarge,

    /// Token is not a three-part compact JWS, or a part is not valid base64url.
    #[error("Token is malformed")]
    MalformedToken,

    /// Header or payload is not the expected JSON shape.
    #[error("Token segment is not valid JSON: {0}")]
    InvalidJson(String),
}

// =============================================================================
// Types
// =============================================================================

/// The parts of a JWS header used to pick verification keys.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm name (e.g. `EdDSA`, `RS256`).
    pub alg: String,

    /// Key ID, if the issuer set one. Empty strings are treated as absent.
    #[serde(default)]
    pub kid: Option<String>,

    /// Media type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWT into its three segments after the size check.
fn split_token(token: &str) -> Result<(&str, &str, &str), JwtError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() =>
        {
            Ok((header, payload, signature))
        }
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            Err(JwtError::MalformedToken)
        }
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, JwtError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT segment base64");
        JwtError::MalformedToken
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT segment JSON");
        JwtError::InvalidJson(e.to_string())
    })
}

/// Read the header of a JWT without verifying the signature.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Not three segments, or the header is not base64url
/// - `InvalidJson` - The header is not a JSON object with an `alg` string
pub fn peek_header(token: &str) -> Result<TokenHeader, JwtError> {
    let (header, _, _) = split_token(token)?;
    let mut header: TokenHeader = decode_segment(header)?;
    if header.kid.as_deref().is_some_and(str::is_empty) {
        header.kid = None;
    }
    Ok(header)
}

/// Decode the payload of a JWT without verifying the signature.
///
/// Only for values the holder of the token needs before it can verify
/// anything, such as the client reading `exp` to schedule a refresh.
///
/// # Errors
///
/// Same as [`peek_header`], applied to the payload segment.
pub fn peek_claims<T: DeserializeOwned>(token: &str) -> Result<T, JwtError> {
    let (_, payload, _) = split_token(token)?;
    decode_segment(payload)
}

/// Decode a base64url (unpadded) JWK key component such as `x`, `y`, `n`, `e`.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the component is not valid base64url.
pub fn decode_key_component(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn encode(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json)
    }

    #[test]
    fn test_constants() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
        assert_eq!(DEFAULT_LEEWAY, Duration::ZERO);
        assert_eq!(MAX_LEEWAY, Duration::from_secs(600));
    }

    #[test]
    fn test_peek_header_with_kid() {
        let token = format!(
            "{}.{}.sig",
            encode(r#"{"alg":"EdDSA","typ":"JWT","kid":"key-01"}"#),
            encode("{}")
        );

        let header = peek_header(&token).unwrap();
        assert_eq!(header.alg, "EdDSA");
        assert_eq!(header.kid.as_deref(), Some("key-01"));
        assert_eq!(header.typ.as_deref(), Some("JWT"));
    }

    #[test]
    fn test_peek_header_without_kid() {
        let token = format!("{}.{}.sig", encode(r#"{"alg":"RS256"}"#), encode("{}"));

        let header = peek_header(&token).unwrap();
        assert_eq!(header.alg, "RS256");
        assert!(header.kid.is_none());
    }

    #[test]
    fn test_peek_header_empty_kid_is_absent() {
        let token = format!(
            "{}.{}.sig",
            encode(r#"{"alg":"EdDSA","kid":""}"#),
            encode("{}")
        );

        assert!(peek_header(&token).unwrap().kid.is_none());
    }

    #[test]
    fn test_peek_header_rejects_wrong_segment_count() {
        assert_eq!(peek_header("single"), Err(JwtError::MalformedToken));
        assert_eq!(peek_header("only.two"), Err(JwtError::MalformedToken));
        assert_eq!(peek_header("a.b.c.d"), Err(JwtError::MalformedToken));
        assert_eq!(peek_header(""), Err(JwtError::MalformedToken));
        assert_eq!(peek_header(".payload.sig"), Err(JwtError::MalformedToken));
    }

    #[test]
    fn test_peek_header_rejects_bad_base64() {
        assert_eq!(
            peek_header("!!!invalid!!!.payload.sig"),
            Err(JwtError::MalformedToken)
        );
    }

    #[test]
    fn test_peek_header_rejects_missing_alg() {
        let token = format!("{}.{}.sig", encode(r#"{"typ":"JWT"}"#), encode("{}"));
        assert!(matches!(peek_header(&token), Err(JwtError::InvalidJson(_))));
    }

    #[test]
    fn test_peek_header_rejects_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(peek_header(&oversized), Err(JwtError::TokenTooLarge));
    }

    #[test]
    fn test_peek_header_at_size_limit() {
        let header_b64 = encode(r#"{"alg":"EdDSA","kid":"key"}"#);
        let payload_b64 = encode("{}");
        let sig_len = MAX_JWT_SIZE_BYTES - header_b64.len() - payload_b64.len() - 2;
        let token = format!("{header_b64}.{payload_b64}.{}", "s".repeat(sig_len));
        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);

        assert!(peek_header(&token).is_ok());
    }

    #[test]
    fn test_peek_claims_reads_exp() {
        #[derive(Deserialize)]
        struct Expiry {
            exp: Option<i64>,
        }

        let token = format!(
            "{}.{}.sig",
            encode(r#"{"alg":"EdDSA"}"#),
            encode(r#"{"exp":1700000900,"iss":"https://idp"}"#)
        );

        let claims: Expiry = peek_claims(&token).unwrap();
        assert_eq!(claims.exp, Some(1_700_000_900));
    }

    #[test]
    fn test_peek_claims_rejects_non_json_payload() {
        #[derive(Debug, Deserialize)]
        struct Expiry {
            #[allow(dead_code)]
            exp: i64,
        }

        let token = format!("{}.{}.sig", encode(r#"{"alg":"EdDSA"}"#), encode("nope"));
        let result: Result<Expiry, _> = peek_claims(&token);
        assert!(matches!(result, Err(JwtError::InvalidJson(_))));
    }

    #[test]
    fn test_decode_key_component() {
        assert_eq!(decode_key_component("AQAB").unwrap(), vec![1, 0, 1]);
        assert!(decode_key_component("!!!").is_err());
    }

    #[test]
    fn test_error_messages_are_generic() {
        assert_eq!(JwtError::TokenTooLarge.to_string(), "Token is too large");
        assert_eq!(JwtError::MalformedToken.to_string(), "Token is malformed");
    }
}
