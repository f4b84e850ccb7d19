//! # Bridge Test Utilities
//!
//! Shared test utilities for the token bridge crates.
//!
//! This crate provides:
//! - Deterministic Ed25519 keypairs published as JWKs (`TestKeypair`)
//! - A fluent builder for signed bridge tokens (`TokenBuilder`)
//! - A wiremock-backed identity provider (`MockIdp`)
//! - A server harness running the real bridge service router (`TestBridgeServer`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let idp = MockIdp::start(TestKeypair::new(1, "key-1")).await;
//!     let server = TestBridgeServer::spawn(&idp.uri(), &[]).await?;
//!
//!     let token = TokenBuilder::new(&idp.uri(), &server.url())
//!         .signed_by(idp.keypair())
//!         .sign();
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_idp;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_idp::*;
pub use server_harness::*;
pub use token_builders::*;
