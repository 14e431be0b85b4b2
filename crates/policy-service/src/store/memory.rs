//! In-memory rule store.

use super::{decode_records, PolicyStore};
use async_trait::async_trait;
use common::policy::{PolicyAdapter, PolicyError, PolicyRecord, PolicyRule, RuleFilter, Section};
use tokio::sync::RwLock;
use tracing::instrument;

/// Rule records held in process memory.
///
/// Saves build the new list first and swap it in under the write lock, so a
/// concurrent load sees the old or the new list.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    records: RwLock<Vec<PolicyRecord>>,
}

impl InMemoryPolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with `rules`.
    #[must_use]
    pub fn with_rules(rules: &[PolicyRule]) -> Self {
        Self {
            records: RwLock::new(rules.iter().map(PolicyRule::to_record).collect()),
        }
    }

    /// Copy of the stored records.
    pub async fn records(&self) -> Vec<PolicyRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl PolicyAdapter for InMemoryPolicyStore {
    async fn load_policy(&self) -> Result<Vec<PolicyRule>, PolicyError> {
        Ok(decode_records(&self.records.read().await))
    }

    #[instrument(skip_all, fields(rules = rules.len()))]
    async fn save_policy(&self, rules: &[PolicyRule]) -> Result<(), PolicyError> {
        let replacement: Vec<PolicyRecord> = rules.iter().map(PolicyRule::to_record).collect();
        *self.records.write().await = replacement;

        tracing::debug!(target: "policy.store", rules = rules.len(), "Rules replaced");
        Ok(())
    }

    async fn add_policy(&self, sec: Section, rule: &PolicyRule) -> Result<(), PolicyError> {
        sec.ensure_matches(rule.ptype())?;
        self.records.write().await.push(rule.to_record());
        Ok(())
    }

    async fn remove_policy(&self, sec: Section, rule: &PolicyRule) -> Result<(), PolicyError> {
        sec.ensure_matches(rule.ptype())?;
        let target = rule.to_record();

        let mut records = self.records.write().await;
        match records.iter().position(|record| *record == target) {
            Some(index) => {
                records.remove(index);
            }
            None => {
                tracing::debug!(target: "policy.store", "No stored rule to remove");
            }
        }
        Ok(())
    }

    async fn remove_filtered_policy(
        &self,
        sec: Section,
        filter: &RuleFilter,
    ) -> Result<(), PolicyError> {
        sec.ensure_matches(filter.ptype())?;

        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| !filter.matches(record));

        tracing::debug!(
            target: "policy.store",
            removed = before - records.len(),
            "Filtered rules removed"
        );
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn count(&self) -> Result<usize, PolicyError> {
        Ok(self.records.read().await.len())
    }
}
