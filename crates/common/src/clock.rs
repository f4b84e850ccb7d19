//! Wall-clock access.
//!
//! The verifier's expiry check and the client's refresh schedule both read
//! "now" through [`Clock`], so tests can pin time instead of sleeping.

use chrono::{DateTime, Utc};
use std::fmt;

/// Source of the current UTC time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-utils"))]
mod manual {
    use super::Clock;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// A clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock {
        millis: AtomicI64,
    }

    impl ManualClock {
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                millis: AtomicI64::new(start.timestamp_millis()),
            }
        }

        /// Start at a Unix timestamp in seconds.
        #[must_use]
        pub fn at_unix(secs: i64) -> Self {
            Self {
                millis: AtomicI64::new(secs.saturating_mul(1000)),
            }
        }

        pub fn advance(&self, by: Duration) {
            self.millis
                .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
        }

        pub fn set(&self, to: DateTime<Utc>) {
            self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_system_clock_is_current() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::at_unix(1_700_000_000);
        assert_eq!(clock.now().timestamp(), 1_700_000_000);

        clock.advance(Duration::seconds(693));
        assert_eq!(clock.now().timestamp(), 1_700_000_693);

        clock.advance(Duration::milliseconds(500));
        assert_eq!(clock.now().timestamp_millis(), 1_700_000_693_500);

        clock.set(DateTime::from_timestamp(42, 0).unwrap());
        assert_eq!(clock.now().timestamp(), 42);
    }
}
