//! Middleware for the bridge service.
//!
//! # Components
//!
//! - `auth` - Token verification for protected routes
//! - `http_metrics` - Request metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, AuthenticatedToken};
pub use http_metrics::http_metrics_middleware;
