//! In-memory adapter for enforcer and scheduler unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use async_trait::async_trait;
use common::policy::{PolicyAdapter, PolicyError, PolicyRule, RuleFilter, Section};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct TestAdapter {
    pub rules: Mutex<Vec<PolicyRule>>,
    pub fail_loads: AtomicBool,
    pub load_delay: Mutex<Option<Duration>>,
    pub loads: AtomicUsize,
}

impl TestAdapter {
    pub fn with_rules(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
            ..Self::default()
        }
    }

    pub fn set_rules(&self, rules: Vec<PolicyRule>) {
        *self.rules.lock().unwrap() = rules;
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_loads.store(failing, Ordering::SeqCst);
    }

    pub fn set_load_delay(&self, delay: Option<Duration>) {
        *self.load_delay.lock().unwrap() = delay;
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyAdapter for TestAdapter {
    async fn load_policy(&self) -> Result<Vec<PolicyRule>, PolicyError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.load_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(PolicyError::Replication("unavailable".to_string()));
        }
        Ok(self.rules.lock().unwrap().clone())
    }

    async fn save_policy(&self, rules: &[PolicyRule]) -> Result<(), PolicyError> {
        self.set_rules(rules.to_vec());
        Ok(())
    }

    async fn add_policy(&self, _sec: Section, rule: &PolicyRule) -> Result<(), PolicyError> {
        self.rules.lock().unwrap().push(rule.clone());
        Ok(())
    }

    async fn remove_policy(&self, _sec: Section, rule: &PolicyRule) -> Result<(), PolicyError> {
        let mut rules = self.rules.lock().unwrap();
        if let Some(pos) = rules.iter().position(|r| r == rule) {
            rules.remove(pos);
        }
        Ok(())
    }

    async fn remove_filtered_policy(
        &self,
        _sec: Section,
        filter: &RuleFilter,
    ) -> Result<(), PolicyError> {
        self.rules
            .lock()
            .unwrap()
            .retain(|r| !filter.matches(&r.to_record()));
        Ok(())
    }
}

pub(crate) fn p(sub: &str, obj: &str, act: &str) -> PolicyRule {
    PolicyRule::new("p", [sub, obj, act]).unwrap()
}
