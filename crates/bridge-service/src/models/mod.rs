//! Bridge service models.
//!
//! Request/response bodies and the session record read from the identity
//! provider.

use chrono::{DateTime, Utc};
use common::types::UserSnapshot;
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authoritative session record held by the identity provider.
///
/// The session's own bearer token is never serialized back out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,

    pub user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing)]
    pub token: Option<SecretString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A live session and its user, as returned by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub session: SessionRecord,
    pub user: UserSnapshot,
}

/// Body of `GET`/`DELETE /auth/token` on success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenAcceptedResponse {
    pub success: bool,
}

/// How a protected request presented its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessedVia {
    Cookie,
    Header,
}

/// Body of `GET /api/protected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedResponse {
    pub message: u32,
    pub user: UserSnapshot,
    pub accessed_via: AccessedVia,
    pub timestamp: DateTime<Utc>,
}

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    /// Key set state: "local", "resolved" or "unresolved".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<&'static str>,

    /// Generic reason when not ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
