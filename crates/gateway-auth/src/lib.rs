//! Gateway Authentication and Authorization Library
//!
//! Token authentication and replicated policy enforcement for HTTP
//! gateways:
//!
//! - Verify bearer tokens against static keys or a cached remote JWKS
//! - Issue tokens and publish the issuer's public key
//! - Decide requests against a rule set replicated from the policy service,
//!   refreshed in the background
//!
//! # Request Flow
//!
//! ```text
//! middleware::authorize -> token::TokenVerifier -> policy::PolicyEnforcer
//! ```
//!
//! # Modules
//!
//! - `config` - Configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `gateway` - Composition of all components
//! - `handlers` - JWKS publication
//! - `middleware` - Axum authorization middleware
//! - `observability` - Metrics
//! - `policy` - Replication client, snapshots, enforcer and reload task
//! - `token` - Claims, keys, issuer and verifier

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod policy;
pub mod token;

pub use config::{ConfigError, GatewayAuthConfig};
pub use errors::AuthError;
pub use gateway::GatewayAuth;
