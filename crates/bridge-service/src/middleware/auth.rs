//! Authentication middleware for protected routes.
//!
//! Takes the token from an `Authorization: Bearer` header or, failing that,
//! from the session cookie. Verifies it for this service's audience and
//! injects an [`AuthenticatedToken`] into request extensions.

use crate::auth::request::{bearer_header, request_origin, BearerHeader};
use crate::auth::VerifyError;
use crate::errors::ServiceError;
use crate::models::AccessedVia;
use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, Uri},
    middleware::Next,
    response::IntoResponse,
};
use common::types::{TokenClaims, UserSnapshot};
use common::secret::SecretString;
use std::sync::Arc;
use tracing::instrument;

/// A verified token attached to a request.
#[derive(Debug, Clone)]
pub struct AuthenticatedToken {
    pub claims: TokenClaims,
    pub user: UserSnapshot,
    pub token: SecretString,
    pub accessed_via: AccessedVia,
}

/// The audience this service expects: the configured `JWT_AUDIENCE`, else
/// the origin the request was addressed to.
#[must_use]
pub fn expected_audience(state: &AppState, headers: &HeaderMap, uri: &Uri) -> Option<String> {
    state
        .config
        .jwt_audience
        .clone()
        .or_else(|| request_origin(headers, uri))
}

/// Authentication middleware that validates bridge tokens.
///
/// # Response
///
/// - 401 `{"error":"No token provided"}` when neither header nor cookie carries a token
/// - 401 `{"error":"Invalid token"}` when verification fails or the token has no user
/// - Continues to the handler with [`AuthenticatedToken`] in extensions otherwise
#[instrument(skip_all, name = "bridge.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ServiceError> {
    let (token, accessed_via) = match bearer_header(req.headers()) {
        BearerHeader::Token(token) => (token, AccessedVia::Header),
        BearerHeader::Absent | BearerHeader::NotBearer | BearerHeader::Empty => {
            let token = state.cookie.extract(req.headers()).ok_or_else(|| {
                tracing::debug!(target: "bridge.middleware.auth", "No token in header or cookie");
                ServiceError::NoTokenProvided
            })?;
            (token, AccessedVia::Cookie)
        }
    };

    let audience = expected_audience(&state, req.headers(), req.uri()).ok_or_else(|| {
        tracing::debug!(target: "bridge.middleware.auth", "Cannot determine request origin for audience");
        ServiceError::InvalidToken(VerifyError::AudienceMismatch)
    })?;

    let claims = state.verifier.verify(&token, &audience).await?;

    let user = claims.user.clone().ok_or_else(|| {
        tracing::debug!(target: "bridge.middleware.auth", "Verified token carries no user");
        ServiceError::InvalidToken(VerifyError::MalformedToken)
    })?;

    req.extensions_mut().insert(AuthenticatedToken {
        claims,
        user,
        token: SecretString::from(token),
        accessed_via,
    });

    Ok(next.run(req).await)
}
