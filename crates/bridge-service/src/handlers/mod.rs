//! HTTP request handlers for the bridge service.

pub mod health;
pub mod metrics;
pub mod protected;
pub mod session;
pub mod token;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use protected::get_protected;
pub use session::get_session;
pub use token::{accept_token, clear_token};
