//! Single-flight, TTL-aware token cache.
//!
//! [`TokenCache::acquire`] returns the cached token while it is fresh, and
//! otherwise shares one acquisition among every concurrent caller. A token
//! counts as fresh until `acquired_at + factor * (exp - acquired_at)`, so it
//! is replaced well before the verifier would reject it.
//!
//! # Guarantees
//!
//! - Callers that arrive while an acquisition is in flight all observe the
//!   same token or the same failure.
//! - Failures are never cached; the next call starts a new acquisition.
//! - [`TokenCache::invalidate`] discards the cached token and detaches any
//!   in-flight acquisition. A detached acquisition still answers its own
//!   waiters but its result is not stored.
//! - The acquisition runs on its own task, so a caller that gives up cannot
//!   leave the cache stuck waiting on it.

use crate::config::{DEFAULT_EARLY_REFRESH_FACTOR, DEFAULT_ACQUIRE_TIMEOUT, FALLBACK_TOKEN_LIFETIME};
use crate::errors::ClientError;
use crate::issuer::TokenIssuer;
use crate::metrics::{record_cache_lookup, record_token_acquisition};
use chrono::{DateTime, Utc};
use common::clock::{Clock, SystemClock};
use common::jwt::peek_claims;
use futures::future::{BoxFuture, FutureExt, Shared};
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

type Acquisition = Shared<BoxFuture<'static, Result<SecretString, ClientError>>>;

#[derive(Default)]
struct CacheEntry {
    token: Option<SecretString>,
    computed_expiry: Option<DateTime<Utc>>,
    in_flight: Option<Acquisition>,
    /// Bumped by `invalidate`; an acquisition only stores its result if the
    /// generation it started under is still current.
    generation: u64,
}

fn lock(entry: &Mutex<CacheEntry>) -> MutexGuard<'_, CacheEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Deserialize)]
struct ExpiryClaim {
    #[serde(default)]
    exp: Option<i64>,
}

/// When a token acquired at `acquired_at` should be replaced.
///
/// The token's `exp` is read without verifying the signature. Tokens without
/// a readable `exp` are assumed to live [`FALLBACK_TOKEN_LIFETIME`].
#[must_use]
pub fn refresh_point(token: &str, acquired_at: DateTime<Utc>, factor: f64) -> DateTime<Utc> {
    let exp = peek_claims::<ExpiryClaim>(token).ok().and_then(|c| c.exp);

    let lifetime_ms = match exp.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
        Some(expires_at) => (expires_at - acquired_at).num_milliseconds(),
        None => {
            debug!(target: "bridge.client.cache", "Token has no exp, assuming default lifetime");
            i64::try_from(FALLBACK_TOKEN_LIFETIME.as_millis()).unwrap_or(i64::MAX)
        }
    };

    if lifetime_ms <= 0 {
        return acquired_at;
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let fresh_ms = (lifetime_ms as f64 * factor) as i64;
    acquired_at + chrono::Duration::milliseconds(fresh_ms)
}

/// Client-side token cache.
///
/// Instances are independent; share one by wrapping it in an `Arc`.
pub struct TokenCache {
    issuer: Arc<dyn TokenIssuer>,
    clock: Arc<dyn Clock>,
    early_refresh_factor: f64,
    acquire_timeout: Duration,
    entry: Arc<Mutex<CacheEntry>>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entry = lock(&self.entry);
        f.debug_struct("TokenCache")
            .field("early_refresh_factor", &self.early_refresh_factor)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("has_token", &entry.token.is_some())
            .field("computed_expiry", &entry.computed_expiry)
            .field("in_flight", &entry.in_flight.is_some())
            .finish()
    }
}

impl TokenCache {
    #[must_use]
    pub fn new(issuer: Arc<dyn TokenIssuer>) -> Self {
        Self {
            issuer,
            clock: Arc::new(SystemClock),
            early_refresh_factor: DEFAULT_EARLY_REFRESH_FACTOR,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            entry: Arc::new(Mutex::new(CacheEntry::default())),
        }
    }

    /// Set the early refresh factor. Values outside (0, 1] fall back to the default.
    #[must_use]
    pub fn with_early_refresh_factor(mut self, factor: f64) -> Self {
        self.early_refresh_factor = if factor > 0.0 && factor <= 1.0 {
            factor
        } else {
            warn!(target: "bridge.client.cache", factor, "Ignoring out-of-range early refresh factor");
            DEFAULT_EARLY_REFRESH_FACTOR
        };
        self
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The instant after which the cached token will be replaced, if one is cached.
    #[must_use]
    pub fn refresh_at(&self) -> Option<DateTime<Utc>> {
        let entry = lock(&self.entry);
        entry.token.as_ref().and(entry.computed_expiry)
    }

    /// Whether an acquisition is currently in flight.
    #[must_use]
    pub fn is_acquiring(&self) -> bool {
        lock(&self.entry).in_flight.is_some()
    }

    /// Return a fresh token, acquiring one if needed.
    ///
    /// # Errors
    ///
    /// Returns the acquisition's `ClientError`; every concurrent waiter gets
    /// the same one.
    #[instrument(skip_all)]
    pub async fn acquire(&self) -> Result<SecretString, ClientError> {
        let acquisition = {
            let mut entry = lock(&self.entry);
            let now = self.clock.now();

            if let (Some(token), Some(expiry)) = (&entry.token, entry.computed_expiry) {
                if now < expiry {
                    record_cache_lookup("hit");
                    return Ok(token.clone());
                }
                debug!(target: "bridge.client.cache", "Cached token reached its refresh point");
                entry.token = None;
                entry.computed_expiry = None;
            }

            match &entry.in_flight {
                Some(in_flight) => {
                    record_cache_lookup("joined");
                    in_flight.clone()
                }
                None => {
                    record_cache_lookup("miss");
                    self.start_acquisition(&mut entry)
                }
            }
        };

        acquisition.await
    }

    /// Discard the cached token and detach any in-flight acquisition.
    pub fn invalidate(&self) {
        let mut entry = lock(&self.entry);
        entry.token = None;
        entry.computed_expiry = None;
        entry.in_flight = None;
        entry.generation = entry.generation.wrapping_add(1);
        debug!(target: "bridge.client.cache", "Token cache invalidated");
    }

    fn start_acquisition(&self, entry: &mut CacheEntry) -> Acquisition {
        let generation = entry.generation;
        let issuer = Arc::clone(&self.issuer);
        let clock = Arc::clone(&self.clock);
        let shared_entry = Arc::clone(&self.entry);
        let factor = self.early_refresh_factor;
        let timeout = self.acquire_timeout;

        let task = tokio::spawn(async move {
            let start = Instant::now();
            let result = match tokio::time::timeout(timeout, issuer.issue()).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout),
            };
            let acquired_at = clock.now();

            record_token_acquisition(
                match &result {
                    Ok(_) => "success",
                    Err(e) => e.label(),
                },
                start.elapsed(),
            );

            let mut entry = lock(&shared_entry);
            if entry.generation != generation {
                debug!(target: "bridge.client.cache", "Discarding result of invalidated acquisition");
                return result;
            }

            entry.in_flight = None;
            match &result {
                Ok(token) => {
                    let expiry = refresh_point(token.expose_secret(), acquired_at, factor);
                    debug!(
                        target: "bridge.client.cache",
                        refresh_at = %expiry,
                        "Token acquired and cached"
                    );
                    entry.token = Some(token.clone());
                    entry.computed_expiry = Some(expiry);
                }
                Err(e) => {
                    warn!(target: "bridge.client.cache", error = %e, "Token acquisition failed");
                }
            }
            result
        });

        let acquisition = async move {
            task.await
                .unwrap_or_else(|e| Err(ClientError::AcquisitionAborted(e.to_string())))
        }
        .boxed()
        .shared();

        entry.in_flight = Some(acquisition.clone());
        acquisition
    }
}
