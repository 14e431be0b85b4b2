//! Policy enforcement over replicated rules.
//!
//! The enforcer owns the current [`PolicySnapshot`] and publishes new ones
//! through a `watch` channel. Decisions clone the current `Arc` and evaluate
//! without holding any lock, so a reload in progress never blocks them and
//! a decision never sees a half-built rule set.
//!
//! # State
//!
//! ```text
//! Uninitialized --initialize--> Loading --ok--> Ready
//!                                       --err-> Uninitialized
//! Ready --reload--> Reloading --ok/err--> Ready
//! ```

use crate::observability::metrics;
use crate::policy::model::{PolicyModel, PolicySnapshot};
use common::policy::{PolicyAdapter, PolicyError, PolicyRule, RuleFilter, Section};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tracing::instrument;

/// Subject used for requests that carry no token.
pub const DEFAULT_ANONYMOUS_SUBJECT: &str = "anonymous";

#[derive(Debug, Clone)]
pub struct EnforcerConfig {
    /// Subject evaluated when the caller is anonymous (empty subject).
    pub anonymous_subject: String,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            anonymous_subject: DEFAULT_ANONYMOUS_SUBJECT.to_string(),
        }
    }
}

/// Lifecycle of the enforcer's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnforcerState {
    Uninitialized = 0,
    Loading = 1,
    Ready = 2,
    Reloading = 3,
}

impl EnforcerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EnforcerState::Loading,
            2 => EnforcerState::Ready,
            3 => EnforcerState::Reloading,
            _ => EnforcerState::Uninitialized,
        }
    }
}

/// Restores the pre-reload state unless the reload completed. Covers errors
/// as well as a reload future dropped by a timeout.
struct StateGuard<'a> {
    state: &'a AtomicU8,
    restore: EnforcerState,
    armed: bool,
}

impl<'a> StateGuard<'a> {
    fn enter(state: &'a AtomicU8, during: EnforcerState) -> Self {
        let restore = EnforcerState::from_u8(state.swap(during as u8, Ordering::AcqRel));
        Self {
            state,
            restore,
            armed: true,
        }
    }

    fn complete(mut self) {
        self.state.store(EnforcerState::Ready as u8, Ordering::Release);
        self.armed = false;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.store(self.restore as u8, Ordering::Release);
        }
    }
}

/// Decides requests against the latest replicated policy.
pub struct PolicyEnforcer {
    adapter: Arc<dyn PolicyAdapter>,
    config: EnforcerConfig,
    snapshot: watch::Sender<Arc<PolicySnapshot>>,
    state: AtomicU8,
    reload_lock: Mutex<()>,
    next_version: AtomicU64,
}

impl std::fmt::Debug for PolicyEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEnforcer")
            .field("state", &self.state())
            .field("version", &self.snapshot.borrow().version())
            .finish_non_exhaustive()
    }
}

impl PolicyEnforcer {
    /// Enforcer with an empty policy that denies everything until loaded.
    ///
    /// # Errors
    ///
    /// `Storage` when the matching engine cannot be constructed.
    pub async fn new(
        adapter: Arc<dyn PolicyAdapter>,
        config: EnforcerConfig,
    ) -> Result<Self, PolicyError> {
        let (snapshot, _) = watch::channel(Arc::new(PolicySnapshot::empty().await?));

        Ok(Self {
            adapter,
            config,
            snapshot,
            state: AtomicU8::new(EnforcerState::Uninitialized as u8),
            reload_lock: Mutex::new(()),
            next_version: AtomicU64::new(1),
        })
    }

    /// Create an enforcer and perform the first load.
    ///
    /// # Errors
    ///
    /// The first load's failure; there is no previous policy to fall back to.
    pub async fn initialize(
        adapter: Arc<dyn PolicyAdapter>,
        config: EnforcerConfig,
    ) -> Result<Arc<Self>, PolicyError> {
        let enforcer = Self::new(adapter, config).await?;
        enforcer.reload().await?;
        Ok(Arc::new(enforcer))
    }

    #[must_use]
    pub fn state(&self) -> EnforcerState {
        EnforcerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The snapshot current at call time.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// Receiver notified on every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<PolicySnapshot>> {
        self.snapshot.subscribe()
    }

    /// Whether `subject` may perform `method` on `resource`.
    ///
    /// An empty subject is evaluated as the anonymous subject.
    #[must_use]
    pub fn decide(&self, subject: &str, resource: &str, method: &str) -> bool {
        let subject = if subject.is_empty() {
            self.config.anonymous_subject.as_str()
        } else {
            subject
        };

        let snapshot = self.snapshot();
        let allowed = snapshot.decide(subject, resource, method);
        metrics::record_authz_decision(allowed);

        tracing::debug!(
            target: "gateway.policy.enforcer",
            resource,
            method,
            allowed,
            version = snapshot.version(),
            "Authorization decision"
        );
        allowed
    }

    /// Load the full rule set and publish it as a new snapshot.
    ///
    /// Reloads are serialized. On failure the previous snapshot stays in
    /// place.
    ///
    /// # Errors
    ///
    /// The adapter's or engine's error.
    #[instrument(skip_all, name = "gateway.policy.reload")]
    pub async fn reload(&self) -> Result<(), PolicyError> {
        let _serialized = self.reload_lock.lock().await;

        let during = match self.state() {
            EnforcerState::Uninitialized | EnforcerState::Loading => EnforcerState::Loading,
            EnforcerState::Ready | EnforcerState::Reloading => EnforcerState::Reloading,
        };
        let guard = StateGuard::enter(&self.state, during);
        let started = Instant::now();

        match self.build_snapshot().await {
            Ok(snapshot) => {
                let rule_count = snapshot.model().len();
                let version = snapshot.version();
                self.snapshot.send_replace(Arc::new(snapshot));
                guard.complete();

                metrics::record_policy_reload("success", started.elapsed(), Some(rule_count));
                tracing::info!(
                    target: "gateway.policy.enforcer",
                    version,
                    rule_count,
                    "Policy snapshot published"
                );
                Ok(())
            }
            Err(e) => {
                metrics::record_policy_reload("error", started.elapsed(), None);
                tracing::warn!(
                    target: "gateway.policy.enforcer",
                    error = %e,
                    "Policy reload failed, keeping previous snapshot"
                );
                Err(e)
            }
        }
    }

    async fn build_snapshot(&self) -> Result<PolicySnapshot, PolicyError> {
        let rules = self.adapter.load_policy().await?;
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        PolicySnapshot::build(PolicyModel::from_rules(rules), version).await
    }

    /// Insert a rule into the authoritative store. Visible after the next
    /// reload.
    ///
    /// # Errors
    ///
    /// The adapter's error, unchanged.
    pub async fn add_policy(&self, sec: Section, rule: &PolicyRule) -> Result<(), PolicyError> {
        self.adapter.add_policy(sec, rule).await?;
        tracing::debug!(target: "gateway.policy.enforcer", rule = %rule, "Rule added");
        Ok(())
    }

    /// Delete one rule from the authoritative store.
    ///
    /// # Errors
    ///
    /// The adapter's error, unchanged.
    pub async fn remove_policy(&self, sec: Section, rule: &PolicyRule) -> Result<(), PolicyError> {
        self.adapter.remove_policy(sec, rule).await?;
        tracing::debug!(target: "gateway.policy.enforcer", rule = %rule, "Rule removed");
        Ok(())
    }

    /// Delete every rule selected by `filter`.
    ///
    /// # Errors
    ///
    /// The adapter's error, unchanged.
    pub async fn remove_filtered_policy(
        &self,
        sec: Section,
        filter: &RuleFilter,
    ) -> Result<(), PolicyError> {
        self.adapter.remove_filtered_policy(sec, filter).await?;
        tracing::debug!(
            target: "gateway.policy.enforcer",
            ptype = %filter.ptype(),
            field_index = filter.field_index(),
            "Filtered rules removed"
        );
        Ok(())
    }

    /// Replace the authoritative rule set with the current snapshot's rules.
    ///
    /// # Errors
    ///
    /// The adapter's error, unchanged.
    pub async fn save_policy(&self) -> Result<(), PolicyError> {
        let rules: Vec<PolicyRule> = self.snapshot().model().iter().cloned().collect();
        self.adapter.save_policy(&rules).await?;
        tracing::debug!(target: "gateway.policy.enforcer", rule_count = rules.len(), "Rule set saved");
        Ok(())
    }
}
