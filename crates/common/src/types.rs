//! Token claim types shared by the bridge service and client.
//!
//! Identifying fields (`sub`, `user.email`) are redacted in `Debug` output so
//! claims can be attached to tracing spans without leaking them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The `aud` claim: a single audience or a list of audiences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    /// True when `expected` equals the audience (or one of the audiences)
    /// exactly. No wildcards, no normalization.
    #[must_use]
    pub fn contains_exact(&self, expected: &str) -> bool {
        match self {
            Self::Single(aud) => aud == expected,
            Self::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Snapshot of the user embedded in a token at issuance time.
///
/// Fields the provider adds beyond the known ones are kept in `extra` and
/// serialized back out unchanged.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub email_verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for UserSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSnapshot")
            .field("id", &self.id)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("name", &self.name)
            .field("email_verified", &self.email_verified)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("extra_fields", &self.extra.len())
            .finish_non_exhaustive()
    }
}

/// Claims carried by a bridge token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer. Compared exactly against the trusted issuer.
    pub iss: String,

    /// Audience. Compared exactly against the expected audience.
    pub aud: Audience,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Subject - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Embedded user snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSnapshot>,
}

impl fmt::Debug for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClaims")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user)
            .finish()
    }
}

impl TokenClaims {
    /// Expiry as a UTC timestamp, or `None` if `exp` is out of range.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// The subject identifier, taken from `sub` or else the embedded user id.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.sub
            .as_deref()
            .or_else(|| self.user.as_ref().map(|u| u.id.as_str()))
    }
}
