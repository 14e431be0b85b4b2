//! Policy Service Library
//!
//! Authoritative store of authorization rules, served to gateways over the
//! `gatekeeper.policy.PolicyReplication` gRPC protocol.
//!
//! # Modules
//!
//! - `config` - Configuration from environment
//! - `errors` - Service error type
//! - `grpc` - Replication service implementation
//! - `observability` - Prometheus metrics
//! - `repositories` - `policy_rules` table access
//! - `store` - PostgreSQL and in-memory rule stores, seed loading

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod errors;
pub mod grpc;
pub mod observability;
pub mod repositories;
pub mod store;

pub use config::{Config, ConfigError, StoreBackend};
pub use errors::PolicyServiceError;
pub use grpc::PolicyReplicationService;
pub use store::{InMemoryPolicyStore, PgPolicyStore, PolicyStore};
