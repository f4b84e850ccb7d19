//! Service layer for the bridge service.
//!
//! # Components
//!
//! - `session_client` - Session lookup against the identity provider

pub mod session_client;

pub use session_client::{IdpSessionClient, SessionError, SessionLookup};
