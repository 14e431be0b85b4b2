//! gRPC services of the policy service.

pub mod policy_service;

pub use policy_service::PolicyReplicationService;
