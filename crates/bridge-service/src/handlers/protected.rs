//! Sample protected resource.

use crate::middleware::AuthenticatedToken;
use crate::models::ProtectedResponse;
use axum::{Extension, Json};
use chrono::Utc;
use tracing::instrument;

/// Handler for GET /api/protected
///
/// ```json
/// {
///   "message": 42,
///   "user": { "id": "user-123", "email": "ada@example.com", ... },
///   "accessedVia": "cookie",
///   "timestamp": "2024-01-01T00:00:00Z"
/// }
/// ```
#[instrument(skip_all, name = "bridge.handlers.protected")]
pub async fn get_protected(
    Extension(auth): Extension<AuthenticatedToken>,
) -> Json<ProtectedResponse> {
    tracing::debug!(
        target: "bridge.handlers.protected",
        accessed_via = ?auth.accessed_via,
        "Serving protected resource"
    );

    Json(ProtectedResponse {
        message: 42,
        user: auth.user,
        accessed_via: auth.accessed_via,
        timestamp: Utc::now(),
    })
}
