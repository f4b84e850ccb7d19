//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs and their JWK form.
//! All fixtures are deterministic based on seed values.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// A deterministic Ed25519 signing keypair with a key id.
///
/// # Example
/// ```rust,ignore
/// let keypair = TestKeypair::new(1, "key-1");
/// let jwks = keypair.jwks_json();
/// let token = keypair.sign(&json!({ "iss": "...", "aud": "...", "exp": 0 }));
/// ```
#[derive(Clone)]
pub struct TestKeypair {
    kid: String,
    public_key: Vec<u8>,
    pkcs8: Vec<u8>,
}

impl std::fmt::Debug for TestKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestKeypair")
            .field("kid", &self.kid)
            .field("pkcs8", &"[REDACTED]")
            .finish()
    }
}

impl TestKeypair {
    /// Create the keypair for `seed`. The same seed always yields the same key.
    ///
    /// # Panics
    /// Panics if ring rejects the derived seed.
    pub fn new(seed: u8, kid: &str) -> Self {
        Self::try_new(seed, kid).expect("deterministic test keypair")
    }

    /// Fallible form of [`TestKeypair::new`].
    pub fn try_new(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let seed_bytes = seed_bytes(seed);
        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate test keypair: {e:?}")))?;

        Ok(Self {
            kid: kid.to_string(),
            public_key: key_pair.public_key().as_ref().to_vec(),
            pkcs8: build_pkcs8_from_seed(&seed_bytes),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Raw 32-byte public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Public key as an `OKP`/`Ed25519` JWK.
    pub fn jwk_json(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "kid": self.kid,
            "x": URL_SAFE_NO_PAD.encode(&self.public_key),
            "alg": "EdDSA",
            "use": "sig",
        })
    }

    /// A `{ "keys": [...] }` document holding only this key.
    pub fn jwks_json(&self) -> Value {
        json!({ "keys": [self.jwk_json()] })
    }

    /// Sign `claims` as an EdDSA JWT with this key's `kid` in the header.
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_header(claims, Some(&self.kid))
    }

    /// Sign `claims`, choosing the header `kid` (or none).
    pub fn sign_with_header(&self, claims: &Value, kid: Option<&str>) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = kid.map(str::to_string);

        jsonwebtoken::encode(&header, claims, &EncodingKey::from_ed_der(&self.pkcs8))
            .expect("signing test token")
    }
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// Ring doesn't expose PKCS#8 export for a seeded keypair, so the DER is
/// assembled by hand. Test-only.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // SEQUENCE { version INTEGER 0, AlgorithmIdentifier { OID 1.3.101.112 },
    //            privateKey OCTET STRING { OCTET STRING seed } }
    let mut pkcs8 = Vec::with_capacity(48);

    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
