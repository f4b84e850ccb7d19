//! Health check handlers.
//!
//! - `/health`: Liveness probe, returns OK while the process is running
//! - `/ready`: Readiness probe, checks the key set can be resolved

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Liveness probe handler.
///
/// Does not check dependencies; failure means the process is hung.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 when the verifier's key set resolves and the service is not
/// draining, 503 otherwise. A remote key set is fetched here on first call,
/// so readiness also warms the verifier.
#[tracing::instrument(skip_all, name = "bridge.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.draining.load(Ordering::SeqCst) {
        tracing::info!(target: "bridge.health", "Readiness check failed: draining");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                keys: None,
                error: Some("Service is shutting down".to_string()),
            }),
        );
    }

    if !state.verifier.is_ready().await {
        tracing::warn!(target: "bridge.health", "Readiness check failed: key set unavailable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                keys: Some(state.verifier.key_status()),
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            keys: Some(state.verifier.key_status()),
            error: None,
        }),
    )
}
