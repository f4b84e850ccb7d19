//! Token Bridge Service Library
//!
//! The dependent-service side of the token bridge. A user signed in at the
//! identity provider (IdP) gets a short-lived signed token; this service
//! verifies it against the IdP's published keys and binds it to an
//! `HttpOnly` session cookie, so later browser requests authenticate without
//! the IdP's own cookie.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> handlers/*.rs -> services/*.rs
//!                        |
//!                  auth/verifier.rs -> auth/key_source.rs -> auth/jwks.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Token verification, key sources, cookies and request inspection
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication and HTTP metrics middleware
//! - `models` - Request/response bodies and session records
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup and application state
//! - `services` - Session lookup at the identity provider

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
