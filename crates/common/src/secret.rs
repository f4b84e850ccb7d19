//! Secret types for bearer tokens and session credentials.
//!
//! Re-exports the [`secrecy`] types used wherever a raw token string is held:
//! the client's token cache, the propagator's `Authorization` headers, the
//! service's authenticated-request extension, and the IdP session credential.
//!
//! A struct that derives `Debug` and holds a `SecretString` prints
//! `[REDACTED]` for it, so tracing a request context never leaks a JWT.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Registration {
//!     service: String,
//!     token: SecretString,
//! }
//!
//! let reg = Registration {
//!     service: "https://svc-b.example.com".to_string(),
//!     token: SecretString::from("eyJhbGciOiJFZERTQSJ9.e30.sig"),
//! };
//!
//! assert!(!format!("{reg:?}").contains("eyJhbGci"));
//! let header = format!("Bearer {}", reg.token.expose_secret());
//! assert!(header.starts_with("Bearer eyJ"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};
