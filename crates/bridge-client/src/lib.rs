//! Bridge client library.
//!
//! The client side of the token bridge: acquires tokens from the identity
//! provider, caches them until shortly before expiry, and propagates them to
//! dependent services so each can mint its own session cookie.
//!
//! # Modules
//!
//! - `bridge` - Session lifecycle driver ([`TokenBridge`])
//! - `config` - Configuration from environment variables
//! - `errors` - Client error type
//! - `fetcher` - Authorized JSON fetches against services
//! - `issuer` - Token issuance at the IdP
//! - `metrics` - Client metrics
//! - `propagator` - Token fan-out to services
//! - `token_cache` - Single-flight, TTL-aware token cache

#![warn(clippy::pedantic)]

pub mod bridge;
pub mod config;
pub mod errors;
pub mod fetcher;
pub mod issuer;
pub mod metrics;
pub mod propagator;
pub mod token_cache;

pub use bridge::{spawn_session_watcher, SessionState, TokenBridge};
pub use config::ClientConfig;
pub use errors::ClientError;
pub use fetcher::AuthorizedClient;
pub use issuer::{HttpTokenIssuer, TokenIssuer};
pub use propagator::{PropagationReport, Propagator, ServiceOutcome};
pub use token_cache::TokenCache;
