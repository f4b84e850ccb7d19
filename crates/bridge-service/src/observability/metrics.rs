//! Metrics definitions for the bridge service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `bridge_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: the fixed route table plus `/other`
//! - `status`: 3 values (success, error, timeout)
//! - `outcome`: bounded by verification error variants

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("bridge_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("bridge_jwks_fetch".to_string()),
            &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("bridge_session_lookup".to_string()),
            &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set session lookup buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `bridge_http_requests_total`, `bridge_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("bridge_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("bridge_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto the fixed route table.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/auth/token" => "/auth/token",
        "/api/protected" => "/api/protected",
        "/api/session" => "/api/session",
        _ => "/other",
    }
}

// ============================================================================
// Token Verification Metrics
// ============================================================================

/// Record a token verification outcome
///
/// Metric: `bridge_token_verifications_total`
/// Labels: `outcome` (`success` or the failure kind)
pub fn record_token_verification(outcome: &'static str) {
    counter!("bridge_token_verifications_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Identity Provider Metrics
// ============================================================================

/// Record a key set fetch
///
/// Metric: `bridge_jwks_fetches_total`, `bridge_jwks_fetch_duration_seconds`
/// Labels: `status` (success, error)
pub fn record_jwks_fetch(status: &'static str, duration: Duration) {
    histogram!("bridge_jwks_fetch_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("bridge_jwks_fetches_total", "status" => status).increment(1);
}

/// Record a session lookup against the identity provider
///
/// Metric: `bridge_session_lookups_total`, `bridge_session_lookup_duration_seconds`
/// Labels: `status` (found, not_found, error)
pub fn record_session_lookup(status: &'static str, duration: Duration) {
    histogram!("bridge_session_lookup_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("bridge_session_lookups_total", "status" => status).increment(1);
}
