//! JSON Web Key parsing.
//!
//! Turns a JWKS document (or a single JWK) into a [`KeySet`] of ready-to-use
//! decoding keys. Supported key types:
//!
//! - `OKP` / `Ed25519` for `EdDSA` (the identity provider's default)
//! - `RSA` for `RS256`/`RS384`/`RS512`/`PS256`/`PS384`/`PS512`
//! - `EC` / `P-256` or `P-384` for `ES256`/`ES384`
//!
//! Keys declaring a `use` other than `sig` are skipped, as are keys of an
//! unsupported type. A document that yields no usable key is an error.

use common::jwt::decode_key_component;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// JSON Web Key as published by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("OKP", "RSA", "EC").
    pub kty: String,

    /// Key ID - used to select the key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Curve name for OKP/EC keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// Public key value (OKP) or x coordinate (EC), base64url.
    #[serde(default)]
    pub x: Option<String>,

    /// y coordinate (EC), base64url.
    #[serde(default)]
    pub y: Option<String>,

    /// Modulus (RSA), base64url.
    #[serde(default)]
    pub n: Option<String>,

    /// Exponent (RSA), base64url.
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm the key is restricted to, if any.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// Key family, derived from `kty` on the key side and `alg` on the token side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Okp,
    Rsa,
    Ec,
}

impl KeyFamily {
    /// The key family a token algorithm needs, or `None` for algorithms the
    /// bridge never accepts (symmetric HMAC).
    #[must_use]
    pub fn for_algorithm(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::EdDSA => Some(Self::Okp),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(Self::Rsa),
            Algorithm::ES256 | Algorithm::ES384 => Some(Self::Ec),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwkError {
    #[error("Key set is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Key set contains no usable signing keys")]
    NoUsableKeys,
}

/// A verification key ready for `jsonwebtoken::decode`.
#[derive(Clone)]
pub struct VerificationKey {
    pub kid: Option<String>,
    pub family: KeyFamily,
    /// Algorithm pinned by the key's `alg` member.
    pub alg: Option<Algorithm>,
    pub decoding_key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Whether this key may verify a token signed with `alg`.
    #[must_use]
    pub fn accepts(&self, alg: Algorithm) -> bool {
        KeyFamily::for_algorithm(alg) == Some(self.family) && self.alg.map_or(true, |a| a == alg)
    }

    /// Build a key from a JWK. Returns `None` for keys that are not usable
    /// for signature verification.
    #[must_use]
    pub fn from_jwk(jwk: &Jwk) -> Option<Self> {
        if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
            tracing::debug!(
                target: "bridge.auth.jwks",
                kid = ?jwk.kid,
                key_use = ?jwk.key_use,
                "Skipping non-signing key"
            );
            return None;
        }

        let alg = match jwk.alg.as_deref() {
            Some(name) => match Algorithm::from_str(name) {
                Ok(alg) => Some(alg),
                Err(_) => {
                    tracing::debug!(target: "bridge.auth.jwks", kid = ?jwk.kid, alg = %name, "Skipping key with unknown alg");
                    return None;
                }
            },
            None => None,
        };

        let (family, decoding_key) = match jwk.kty.as_str() {
            "OKP" => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    tracing::debug!(target: "bridge.auth.jwks", kid = ?jwk.kid, crv = ?jwk.crv, "Skipping OKP key with unsupported curve");
                    return None;
                }
                let public_key = decode_key_component(jwk.x.as_deref()?).ok()?;
                if public_key.len() != 32 {
                    tracing::debug!(
                        target: "bridge.auth.jwks",
                        kid = ?jwk.kid,
                        actual_len = public_key.len(),
                        "Skipping Ed25519 key with wrong length"
                    );
                    return None;
                }
                (KeyFamily::Okp, DecodingKey::from_ed_der(&public_key))
            }
            "RSA" => {
                let key =
                    DecodingKey::from_rsa_components(jwk.n.as_deref()?, jwk.e.as_deref()?).ok()?;
                (KeyFamily::Rsa, key)
            }
            "EC" => {
                if !matches!(jwk.crv.as_deref(), Some("P-256" | "P-384")) {
                    tracing::debug!(target: "bridge.auth.jwks", kid = ?jwk.kid, crv = ?jwk.crv, "Skipping EC key with unsupported curve");
                    return None;
                }
                let key =
                    DecodingKey::from_ec_components(jwk.x.as_deref()?, jwk.y.as_deref()?).ok()?;
                (KeyFamily::Ec, key)
            }
            other => {
                tracing::debug!(target: "bridge.auth.jwks", kid = ?jwk.kid, kty = %other, "Skipping key with unsupported type");
                return None;
            }
        };

        if alg.is_some_and(|a| KeyFamily::for_algorithm(a) != Some(family)) {
            tracing::debug!(target: "bridge.auth.jwks", kid = ?jwk.kid, "Skipping key whose alg does not match its type");
            return None;
        }

        Some(Self {
            kid: jwk.kid.clone().filter(|k| !k.is_empty()),
            family,
            alg,
            decoding_key,
        })
    }
}

/// The set of keys a verifier trusts.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: Vec<VerificationKey>,
}

impl KeySet {
    /// Build a key set from parsed JWKs, dropping unusable ones.
    ///
    /// # Errors
    ///
    /// Returns `JwkError::NoUsableKeys` if nothing usable remains.
    pub fn from_jwks(jwks: &[Jwk]) -> Result<Self, JwkError> {
        let keys: Vec<VerificationKey> = jwks.iter().filter_map(VerificationKey::from_jwk).collect();
        if keys.is_empty() {
            return Err(JwkError::NoUsableKeys);
        }
        Ok(Self { keys })
    }

    /// Parse either a `{ "keys": [...] }` document or a single JWK object.
    ///
    /// # Errors
    ///
    /// Returns `JwkError::InvalidJson` if the text is neither shape, or
    /// `JwkError::NoUsableKeys` if it holds no usable key.
    pub fn parse(json: &str) -> Result<Self, JwkError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| JwkError::InvalidJson(e.to_string()))?;

        let jwks = if value.get("keys").is_some() {
            serde_json::from_value::<JwksResponse>(value)
                .map_err(|e| JwkError::InvalidJson(e.to_string()))?
                .keys
        } else {
            vec![serde_json::from_value::<Jwk>(value)
                .map_err(|e| JwkError::InvalidJson(e.to_string()))?]
        };

        Self::from_jwks(&jwks)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys eligible to verify a token with this header.
    ///
    /// With a `kid`, only keys carrying that `kid` are candidates. Without
    /// one, every key whose type fits `alg` is tried in turn.
    pub fn candidates<'a>(
        &'a self,
        kid: Option<&'a str>,
        alg: Algorithm,
    ) -> impl Iterator<Item = &'a VerificationKey> + 'a {
        self.keys.iter().filter(move |key| {
            key.accepts(alg)
                && match kid {
                    Some(kid) => key.kid.as_deref() == Some(kid),
                    None => true,
                }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // RFC 8037 A.2 public key
    const ED25519_X: &str = "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo";

    fn okp_json(kid: &str) -> String {
        format!(r#"{{"kty":"OKP","crv":"Ed25519","x":"{ED25519_X}","kid":"{kid}","alg":"EdDSA","use":"sig"}}"#)
    }

    #[test]
    fn test_jwk_deserialization() {
        let jwk: Jwk = serde_json::from_str(&okp_json("key-1")).unwrap();
        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.kid.as_deref(), Some("key-1"));
        assert_eq!(jwk.crv.as_deref(), Some("Ed25519"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
    }

    #[test]
    fn test_parse_key_set_document() {
        let json = format!(r#"{{"keys":[{},{}]}}"#, okp_json("a"), okp_json("b"));
        let set = KeySet::parse(&json).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_parse_single_jwk() {
        let set = KeySet::parse(&okp_json("only")).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(KeySet::parse("not json"), Err(JwkError::InvalidJson(_))));
        assert!(matches!(
            KeySet::parse(r#"{"keys":"nope"}"#),
            Err(JwkError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_set() {
        assert_eq!(KeySet::parse(r#"{"keys":[]}"#).unwrap_err(), JwkError::NoUsableKeys);
    }

    #[test]
    fn test_skips_encryption_keys() {
        let json = format!(
            r#"{{"kty":"OKP","crv":"Ed25519","x":"{ED25519_X}","kid":"enc","use":"enc"}}"#
        );
        assert_eq!(KeySet::parse(&json).unwrap_err(), JwkError::NoUsableKeys);
    }

    #[test]
    fn test_skips_wrong_length_ed25519_key() {
        let json = r#"{"kty":"OKP","crv":"Ed25519","x":"AAAA","kid":"short"}"#;
        assert_eq!(KeySet::parse(json).unwrap_err(), JwkError::NoUsableKeys);
    }

    #[test]
    fn test_skips_unsupported_key_types() {
        let json = r#"{"keys":[{"kty":"oct","k":"c2VjcmV0"},{"kty":"OKP","crv":"X25519","x":"AAAA"}]}"#;
        assert_eq!(KeySet::parse(json).unwrap_err(), JwkError::NoUsableKeys);
    }

    #[test]
    fn test_skips_alg_type_mismatch() {
        let json = format!(r#"{{"kty":"OKP","crv":"Ed25519","x":"{ED25519_X}","alg":"RS256"}}"#);
        assert_eq!(KeySet::parse(&json).unwrap_err(), JwkError::NoUsableKeys);
    }

    #[test]
    fn test_parse_rsa_key() {
        // RFC 7517 A.1 example RSA public key
        let json = r#"{"kty":"RSA","kid":"2011-04-29","n":"0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw","e":"AQAB","alg":"RS256"}"#;
        let set = KeySet::parse(json).unwrap();
        assert_eq!(set.candidates(Some("2011-04-29"), Algorithm::RS256).count(), 1);
        assert_eq!(set.candidates(None, Algorithm::RS384).count(), 0);
        assert_eq!(set.candidates(None, Algorithm::EdDSA).count(), 0);
    }

    #[test]
    fn test_candidates_by_kid() {
        let json = format!(r#"{{"keys":[{},{}]}}"#, okp_json("a"), okp_json("b"));
        let set = KeySet::parse(&json).unwrap();

        assert_eq!(set.candidates(Some("a"), Algorithm::EdDSA).count(), 1);
        assert_eq!(set.candidates(Some("zzz"), Algorithm::EdDSA).count(), 0);
        assert_eq!(set.candidates(None, Algorithm::EdDSA).count(), 2);
    }

    #[test]
    fn test_hmac_is_never_accepted() {
        assert_eq!(KeyFamily::for_algorithm(Algorithm::HS256), None);
        let set = KeySet::parse(&okp_json("a")).unwrap();
        assert_eq!(set.candidates(None, Algorithm::HS256).count(), 0);
    }
}
