//! Common utilities and types shared across the token bridge crates.

#![warn(clippy::pedantic)]

/// Module for wall-clock access that tests can control
pub mod clock;

/// Module for the explicit outbound HTTP request options
pub mod config;

/// Module for JWT utilities (size limits, unverified header/claim peeking)
pub mod jwt;

/// Module for the retry policy shared by outbound fan-out calls
pub mod retry;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for token claim types
pub mod types;
