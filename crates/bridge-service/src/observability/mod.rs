//! Observability module for the bridge service.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;
