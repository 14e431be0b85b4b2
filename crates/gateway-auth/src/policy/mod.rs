//! Replicated authorization policy.
//!
//! - `adapter` - gRPC client for the central rule store
//! - `model` - rule index and immutable decision snapshots
//! - `enforcer` - snapshot owner and decision entry point
//! - `reload` - background refresh of the snapshot

pub mod adapter;
pub mod enforcer;
pub mod model;
pub mod reload;

#[cfg(test)]
pub(crate) mod test_support;

pub use adapter::{GrpcPolicyAdapter, ReplicationClientConfig};
pub use enforcer::{EnforcerConfig, EnforcerState, PolicyEnforcer};
pub use model::{PolicyModel, PolicySnapshot};
pub use reload::{AutoReloadScheduler, ReloadSchedule};
