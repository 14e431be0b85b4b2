//! Startup seed rules.
//!
//! The seed file is a JSON list of records:
//!
//! ```json
//! [
//!   {"ptype": "p", "v0": "anonymous", "v1": "/v1/health", "v2": "GET"},
//!   {"ptype": "g", "v0": "alice", "v1": "admin"}
//! ]
//! ```
//!
//! Seeds are applied only to an empty store, so restarts never clobber rules
//! changed at runtime.

use super::PolicyStore;
use crate::errors::PolicyServiceError;
use common::policy::{PolicyRecord, PolicyRule};
use std::path::Path;

/// Parse and validate a seed file.
///
/// # Errors
///
/// `Seed` when the file cannot be read, is not a JSON list of records, or
/// holds a record that is not a valid rule.
pub async fn load_seed_file(path: &Path) -> Result<Vec<PolicyRule>, PolicyServiceError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PolicyServiceError::Seed(format!("{}: {e}", path.display())))?;

    let records: Vec<PolicyRecord> = serde_json::from_str(&contents)
        .map_err(|e| PolicyServiceError::Seed(format!("{}: {e}", path.display())))?;

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            PolicyRule::new(record.ptype.clone(), record.values())
                .map_err(|e| PolicyServiceError::Seed(format!("record {index}: {e}")))
        })
        .collect()
}

/// Save `rules` when `store` holds none.
///
/// Returns the number of rules written.
///
/// # Errors
///
/// Store failures as `Policy`.
pub async fn seed_if_empty<S>(store: &S, rules: &[PolicyRule]) -> Result<usize, PolicyServiceError>
where
    S: PolicyStore + ?Sized,
{
    let existing = store.count().await?;
    if existing > 0 {
        tracing::info!(
            target: "policy.store",
            existing,
            "Store already holds rules, seed skipped"
        );
        return Ok(0);
    }

    store.save_policy(rules).await?;
    tracing::info!(target: "policy.store", seeded = rules.len(), "Seed rules applied");

    Ok(rules.len())
}
