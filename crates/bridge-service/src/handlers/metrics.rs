//! Prometheus metrics endpoint handler.
//!
//! `/metrics` is unauthenticated so Prometheus can scrape it. Labels are
//! bounded and carry no tokens or user data.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE bridge_token_verifications_total counter
/// bridge_token_verifications_total{outcome="success"} 42
/// ```
#[tracing::instrument(skip_all, name = "bridge.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
