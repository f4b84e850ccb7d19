//! Bridge service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Clients
//! get a short hint in `{ "error": "<hint>" }`; the underlying cause is
//! logged server-side only.

use crate::auth::VerifyError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Bridge service error type.
///
/// Every authentication failure is a 401 with one of four hints:
/// - `NoTokenProvided`: "No token provided"
/// - `MalformedHeader`: "Invalid authorization header"
/// - `InvalidToken`: "Invalid token" (any verification failure)
/// - `SessionNotFound`, `SessionUnavailable`: "Unauthorized"
///
/// `Internal` is a 500.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No token provided")]
    NoTokenProvided,

    #[error("Invalid authorization header")]
    MalformedHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] VerifyError),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session lookup unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// The hint returned to the client.
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            ServiceError::NoTokenProvided => "No token provided",
            ServiceError::MalformedHeader => "Invalid authorization header",
            ServiceError::InvalidToken(_) => "Invalid token",
            ServiceError::SessionNotFound | ServiceError::SessionUnavailable(_) => "Unauthorized",
            ServiceError::Internal(_) => "Internal server error",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match &self {
            ServiceError::InvalidToken(VerifyError::UpstreamUnavailable(reason))
            | ServiceError::SessionUnavailable(reason) => {
                tracing::warn!(target: "bridge.availability", reason = %reason, "Identity provider unavailable");
            }
            ServiceError::InvalidToken(reason) => {
                tracing::debug!(target: "bridge.auth", reason = %reason, "Token rejected");
            }
            ServiceError::Internal(reason) => {
                tracing::error!(target: "bridge.internal", reason = %reason, "Internal error");
            }
            ServiceError::NoTokenProvided
            | ServiceError::MalformedHeader
            | ServiceError::SessionNotFound => {}
        }

        let status = self.status_code();
        let mut response = (status, Json(ErrorResponse { error: self.hint() })).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"token-bridge\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
