//! Bounded retry with exponential backoff.
//!
//! One [`RetryPolicy`] is shared by every outbound fan-out call. The delay
//! before retry `n` (0-based) is `base_delay * backoff_multiplier^n`, capped at
//! [`MAX_RETRY_DELAY`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of attempts (first try plus three retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default growth factor between consecutive retry delays.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Upper bound on any single retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// Result of [`RetryPolicy::run`]: the final result and how many attempts it took.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn with_backoff_multiplier(mut self, backoff_multiplier: f64) -> Self {
        self.backoff_multiplier = backoff_multiplier;
        self
    }

    /// Delay to wait before retry `retry` (0-based).
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let base_ms = self.base_delay.as_millis() as f64;
        let delay_ms = base_ms * self.backoff_multiplier.powi(exponent);

        #[allow(clippy::cast_precision_loss)]
        let max_ms = MAX_RETRY_DELAY.as_millis() as f64;
        if delay_ms.is_nan() || delay_ms <= 0.0 {
            return Duration::ZERO;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(delay_ms.min(max_ms) as u64)
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. Errors are logged and the
    /// last one is returned; nothing panics or propagates early.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            target: "common.retry",
                            attempt = attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(
                        target: "common.retry",
                        attempts = attempt,
                        error = %e,
                        "Operation failed, retries exhausted"
                    );
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    let delay = self.delay_for_retry(attempt - 1);
                    debug!(
                        target: "common.retry",
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Operation failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
