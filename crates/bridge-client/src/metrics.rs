//! Client-side metrics.
//!
//! All metrics use the `bridge_` prefix and bounded labels. The embedding
//! application installs the recorder; without one these calls are no-ops.

use metrics::{counter, histogram};
use std::time::Duration;

/// Record a token cache lookup.
///
/// Metric: `bridge_token_cache_lookups_total`
/// Labels: `result` ("hit", "miss", "joined")
pub fn record_cache_lookup(result: &'static str) {
    counter!("bridge_token_cache_lookups_total", "result" => result).increment(1);
}

/// Record a token acquisition from the IdP.
///
/// Metrics: `bridge_token_acquisitions_total`, `bridge_token_acquisition_duration_seconds`
/// Labels: `status` ("success" or an error label)
pub fn record_token_acquisition(status: &'static str, duration: Duration) {
    counter!("bridge_token_acquisitions_total", "status" => status).increment(1);
    histogram!("bridge_token_acquisition_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
}

/// Record one propagation attempt against one service.
///
/// Metric: `bridge_propagation_attempts_total`
/// Labels: `operation` ("register", "clear"), `status` ("success" or an error label)
pub fn record_propagation_attempt(operation: &'static str, status: &'static str) {
    counter!(
        "bridge_propagation_attempts_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_propagation_attempt_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_propagation_attempt("register", "success");
            record_propagation_attempt("register", "http_status");
            record_propagation_attempt("register", "http_status");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let failures = snapshot
            .iter()
            .find(|(key, _, _, _)| {
                key.key().name() == "bridge_propagation_attempts_total"
                    && key
                        .key()
                        .labels()
                        .any(|l| l.key() == "status" && l.value() == "http_status")
            })
            .map(|(_, _, _, value)| value)
            .expect("failure counter recorded");

        assert!(matches!(failures, DebugValue::Counter(2)));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_cache_lookup("hit");
        record_token_acquisition("success", Duration::from_millis(5));
    }
}
