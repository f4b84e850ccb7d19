//! Cookie-minting token endpoints.
//!
//! - `GET /auth/token` - Verify a bearer token and bind it to a session cookie
//! - `DELETE /auth/token` - Clear the session cookie
//!
//! The client propagator calls both on every dependent service when a user
//! signs in or out.

use crate::auth::request::{bearer_header, is_secure, BearerHeader};
use crate::auth::VerifyError;
use crate::errors::ServiceError;
use crate::middleware::auth::expected_audience;
use crate::models::TokenAcceptedResponse;
use crate::routes::AppState;
use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, Uri},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

fn with_cookie(cookie: &str) -> Result<Response, ServiceError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| ServiceError::Internal(format!("Invalid cookie header: {e}")))?;

    let mut response = Json(TokenAcceptedResponse { success: true }).into_response();
    response.headers_mut().insert(SET_COOKIE, value);
    Ok(response)
}

/// Handler for GET /auth/token
///
/// # Response
///
/// - 200 `{"success":true}` with `Set-Cookie` when the token verifies
/// - 401 `{"error":"Invalid authorization header"}` when the header is missing or not Bearer
/// - 401 `{"error":"No token provided"}` when the bearer token is empty
/// - 401 `{"error":"Invalid token"}` when verification fails
#[instrument(skip_all, name = "bridge.handlers.accept_token")]
pub async fn accept_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ServiceError> {
    let token = match bearer_header(&headers) {
        BearerHeader::Token(token) => token,
        BearerHeader::Empty => return Err(ServiceError::NoTokenProvided),
        BearerHeader::Absent | BearerHeader::NotBearer => {
            return Err(ServiceError::MalformedHeader)
        }
    };

    let audience = expected_audience(&state, &headers, &uri)
        .ok_or(ServiceError::InvalidToken(VerifyError::AudienceMismatch))?;

    let claims = state.verifier.verify(&token, &audience).await?;

    tracing::info!(
        target: "bridge.handlers.token",
        has_user = claims.user.is_some(),
        "Token accepted, binding session cookie"
    );

    with_cookie(&state.cookie.issue(&token, is_secure(&headers, &uri)))
}

/// Handler for DELETE /auth/token
///
/// Clears the session cookie unconditionally.
#[instrument(skip_all, name = "bridge.handlers.clear_token")]
pub async fn clear_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ServiceError> {
    tracing::debug!(target: "bridge.handlers.token", "Clearing session cookie");
    with_cookie(&state.cookie.clear(is_secure(&headers, &uri)))
}
