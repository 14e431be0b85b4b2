//! # Auth Test Utilities
//!
//! Shared test utilities for gateway authentication and policy replication.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed Ed25519 keys, HMAC secret, JWKS)
//! - A fluent token builder for hand-crafted claims and headers
//! - An in-process policy replication server on an ephemeral port
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let server = TestPolicyServer::start(&[rule("p", &["alice", "/docs", "GET"])]).await;
//!
//!     let token = TestTokenBuilder::new()
//!         .for_user("alice")
//!         .with_audience("content")
//!         .sign_ed25519(1);
//!
//!     server.shutdown().await;
//! }
//! ```

pub mod crypto_fixtures;
pub mod policy_server;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use policy_server::*;
pub use token_builders::*;
