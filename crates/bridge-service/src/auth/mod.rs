//! Token verification and session cookie handling.
//!
//! # Components
//!
//! - `jwks` - JWK parsing into a verification key set
//! - `key_source` - Remote (fetched once) and local key sets
//! - `verifier` - Signature, issuer, audience and expiry checks
//! - `cookie` - The `HttpOnly` session cookie minted from a token
//! - `request` - Bearer header, TLS and origin detection on requests

pub mod cookie;
pub mod jwks;
pub mod key_source;
pub mod request;
pub mod verifier;

pub use cookie::SessionCookie;
pub use key_source::{KeySource, KeySourceError, LocalKeySource, RemoteKeySource};
pub use verifier::{Verifier, VerifyError};
