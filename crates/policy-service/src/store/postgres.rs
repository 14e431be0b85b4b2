//! PostgreSQL rule store.

use super::{decode_records, PolicyStore};
use crate::repositories::PolicyRulesRepository;
use async_trait::async_trait;
use common::policy::{PolicyAdapter, PolicyError, PolicyRecord, PolicyRule, RuleFilter, Section};
use sqlx::PgPool;

/// Rules persisted in the `policy_rules` table.
#[derive(Debug, Clone)]
pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyAdapter for PgPolicyStore {
    async fn load_policy(&self) -> Result<Vec<PolicyRule>, PolicyError> {
        let records = PolicyRulesRepository::load_all(&self.pool).await?;
        Ok(decode_records(&records))
    }

    async fn save_policy(&self, rules: &[PolicyRule]) -> Result<(), PolicyError> {
        let records: Vec<PolicyRecord> = rules.iter().map(PolicyRule::to_record).collect();
        PolicyRulesRepository::replace_all(&self.pool, &records).await?;
        Ok(())
    }

    async fn add_policy(&self, sec: Section, rule: &PolicyRule) -> Result<(), PolicyError> {
        sec.ensure_matches(rule.ptype())?;
        PolicyRulesRepository::insert(&self.pool, &rule.to_record()).await?;
        Ok(())
    }

    async fn remove_policy(&self, sec: Section, rule: &PolicyRule) -> Result<(), PolicyError> {
        sec.ensure_matches(rule.ptype())?;
        let removed = PolicyRulesRepository::delete_one(&self.pool, &rule.to_record()).await?;

        tracing::debug!(target: "policy.store", removed, "Rule removed");
        Ok(())
    }

    async fn remove_filtered_policy(
        &self,
        sec: Section,
        filter: &RuleFilter,
    ) -> Result<(), PolicyError> {
        sec.ensure_matches(filter.ptype())?;
        let removed = PolicyRulesRepository::delete_filtered(&self.pool, filter).await?;

        tracing::debug!(target: "policy.store", removed, "Filtered rules removed");
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn count(&self) -> Result<usize, PolicyError> {
        let count = PolicyRulesRepository::count(&self.pool).await?;
        usize::try_from(count).map_err(|e| PolicyError::Storage(e.to_string()))
    }
}
