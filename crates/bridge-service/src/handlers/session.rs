//! Live session lookup for a verified token.

use crate::errors::ServiceError;
use crate::middleware::AuthenticatedToken;
use crate::models::SessionData;
use crate::routes::AppState;
use crate::services::SessionError;
use axum::{extract::State, Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/session
///
/// Resolves the token's live session at the identity provider. The token
/// has already been verified by the auth middleware; this adds the
/// revocation check that verification alone cannot make.
///
/// # Response
///
/// - 200 `{ "session": {...}, "user": {...} }`
/// - 401 `{"error":"Unauthorized"}` when no live session exists, the session
///   belongs to another subject, or the identity provider is unreachable
#[instrument(skip_all, name = "bridge.handlers.session")]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedToken>,
) -> Result<Json<SessionData>, ServiceError> {
    let data = state
        .sessions
        .resolve(&auth.token)
        .await
        .map_err(|e| match e {
            SessionError::NotFound => ServiceError::SessionNotFound,
            SessionError::Unavailable(reason) => ServiceError::SessionUnavailable(reason),
        })?;

    if auth.claims.subject() != Some(data.session.user_id.as_str()) {
        tracing::warn!(
            target: "bridge.handlers.session",
            "Session subject does not match token subject"
        );
        return Err(ServiceError::SessionNotFound);
    }

    Ok(Json(data))
}
