//! Authoritative rule stores behind the replication server.
//!
//! A store is a [`PolicyAdapter`] that can also report how many rules it
//! holds. Two backends exist:
//!
//! - [`PgPolicyStore`]: `policy_rules` table, full overwrite in one transaction
//! - [`InMemoryPolicyStore`]: record list behind a lock, for local runs and tests

use async_trait::async_trait;
use common::policy::{PolicyAdapter, PolicyError, PolicyRecord, PolicyRule};

pub mod memory;
pub mod postgres;
pub mod seed;

pub use memory::InMemoryPolicyStore;
pub use postgres::PgPolicyStore;
pub use seed::{load_seed_file, seed_if_empty};

/// Rule storage served over the replication protocol.
#[async_trait]
pub trait PolicyStore: PolicyAdapter + 'static {
    /// Number of stored rules.
    async fn count(&self) -> Result<usize, PolicyError>;
}

/// Decode stored records, skipping rows that no longer form a rule.
fn decode_records(records: &[PolicyRecord]) -> Vec<PolicyRule> {
    records
        .iter()
        .filter_map(|record| match record.to_rule() {
            Ok(rule) => Some(rule),
            Err(e) => {
                tracing::warn!(
                    target: "policy.store",
                    ptype = %record.ptype,
                    error = %e,
                    "Skipping undecodable stored rule"
                );
                None
            }
        })
        .collect()
}
