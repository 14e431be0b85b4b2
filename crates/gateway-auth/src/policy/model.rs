//! Immutable policy snapshots.
//!
//! A snapshot pairs the indexed rule set with a matching engine built from
//! exactly those rules. Snapshots are never mutated after construction; a
//! reload builds a new one.

use casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi};
use common::policy::{PolicyError, PolicyRule, Section};
use std::collections::{BTreeMap, BTreeSet};

/// Access-control model evaluated by every snapshot.
///
/// A request `(sub, obj, act)` is allowed when some permission rule names the
/// subject directly or through a role, its object pattern matches the path
/// (`:param` and `*` segments), and its action equals the method or is `*`.
pub const ACCESS_MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = (g(r.sub, p.sub) || r.sub == p.sub) && keyMatch2(r.obj, p.obj) && (r.act == p.act || p.act == "*")
"#;

/// Rules indexed section -> ptype -> ordered rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyModel {
    sections: BTreeMap<Section, BTreeMap<String, Vec<PolicyRule>>>,
}

impl PolicyModel {
    /// Index `rules`, dropping exact duplicates and keeping first-seen order.
    #[must_use]
    pub fn from_rules(rules: impl IntoIterator<Item = PolicyRule>) -> Self {
        let mut seen = BTreeSet::new();
        let mut sections: BTreeMap<Section, BTreeMap<String, Vec<PolicyRule>>> = BTreeMap::new();

        for rule in rules {
            if !seen.insert(rule.clone()) {
                continue;
            }
            sections
                .entry(rule.section())
                .or_default()
                .entry(rule.ptype().to_string())
                .or_default()
                .push(rule);
        }

        Self { sections }
    }

    /// Rules of one ptype.
    #[must_use]
    pub fn rules(&self, sec: Section, ptype: &str) -> &[PolicyRule] {
        self.sections
            .get(&sec)
            .and_then(|by_ptype| by_ptype.get(ptype))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every rule, section by section.
    pub fn iter(&self) -> impl Iterator<Item = &PolicyRule> {
        self.sections.values().flat_map(BTreeMap::values).flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    #[must_use]
    pub fn contains(&self, rule: &PolicyRule) -> bool {
        self.rules(rule.section(), rule.ptype()).contains(rule)
    }
}

/// One published generation of the policy.
pub struct PolicySnapshot {
    version: u64,
    model: PolicyModel,
    engine: Enforcer,
}

impl std::fmt::Debug for PolicySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicySnapshot")
            .field("version", &self.version)
            .field("rules", &self.model.len())
            .finish_non_exhaustive()
    }
}

impl PolicySnapshot {
    /// Build a snapshot with its own engine.
    ///
    /// Only `p` rules of three fields and `g` rules of two fields feed the
    /// engine; other rules stay in the index and are logged.
    ///
    /// # Errors
    ///
    /// `Storage` when the engine cannot be constructed or loaded.
    pub async fn build(model: PolicyModel, version: u64) -> Result<Self, PolicyError> {
        let engine_error = |e: casbin::Error| PolicyError::Storage(format!("policy engine: {e}"));

        let access_model = DefaultModel::from_str(ACCESS_MODEL)
            .await
            .map_err(engine_error)?;
        let mut engine = Enforcer::new(access_model, MemoryAdapter::default())
            .await
            .map_err(engine_error)?;

        let mut permissions = Vec::new();
        let mut groupings = Vec::new();
        for rule in model.iter() {
            match (rule.ptype(), rule.fields().len()) {
                ("p", 3) => permissions.push(rule.fields().to_vec()),
                ("g", 2) => groupings.push(rule.fields().to_vec()),
                _ => tracing::warn!(
                    target: "gateway.policy.model",
                    rule = %rule,
                    "Rule does not fit the access model and is not evaluated"
                ),
            }
        }

        if !permissions.is_empty() {
            engine
                .add_named_policies("p", permissions)
                .await
                .map_err(engine_error)?;
        }
        if !groupings.is_empty() {
            engine
                .add_named_grouping_policies("g", groupings)
                .await
                .map_err(engine_error)?;
        }

        Ok(Self {
            version,
            model,
            engine,
        })
    }

    /// Snapshot with no rules; every request is denied.
    ///
    /// # Errors
    ///
    /// `Storage` when the engine cannot be constructed.
    pub async fn empty() -> Result<Self, PolicyError> {
        Self::build(PolicyModel::default(), 0).await
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn model(&self) -> &PolicyModel {
        &self.model
    }

    /// Evaluate a request. Engine errors deny.
    #[must_use]
    pub fn decide(&self, subject: &str, resource: &str, method: &str) -> bool {
        match self.engine.enforce((subject, resource, method)) {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::error!(
                    target: "gateway.policy.model",
                    error = %e,
                    version = self.version,
                    "Policy evaluation failed, denying"
                );
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn p(sub: &str, obj: &str, act: &str) -> PolicyRule {
        PolicyRule::new("p", [sub, obj, act]).unwrap()
    }

    fn g(user: &str, role: &str) -> PolicyRule {
        PolicyRule::new("g", [user, role]).unwrap()
    }

    #[test]
    fn test_model_indexes_and_dedupes() {
        let model = PolicyModel::from_rules([
            p("alice", "/doc/1", "GET"),
            g("bob", "editor"),
            p("alice", "/doc/1", "GET"),
            p("editor", "/doc/*", "PUT"),
        ]);

        assert_eq!(model.len(), 3);
        assert_eq!(model.rules(Section::Policy, "p").len(), 2);
        assert_eq!(model.rules(Section::Grouping, "g"), [g("bob", "editor")]);
        assert!(model.rules(Section::Grouping, "g2").is_empty());
        assert!(model.contains(&p("editor", "/doc/*", "PUT")));
    }

    #[tokio::test]
    async fn test_direct_permission() {
        let snapshot = PolicySnapshot::build(
            PolicyModel::from_rules([p("alice", "/v1/content", "GET")]),
            1,
        )
        .await
        .unwrap();

        assert!(snapshot.decide("alice", "/v1/content", "GET"));
        assert!(!snapshot.decide("alice", "/v1/content", "POST"));
        assert!(!snapshot.decide("bob", "/v1/content", "GET"));
    }

    #[tokio::test]
    async fn test_role_and_wildcards() {
        let snapshot = PolicySnapshot::build(
            PolicyModel::from_rules([
                p("editor", "/v1/content/:id", "*"),
                p("anonymous", "/v1/public/*", "GET"),
                g("bob", "editor"),
            ]),
            2,
        )
        .await
        .unwrap();

        assert!(snapshot.decide("bob", "/v1/content/42", "DELETE"));
        assert!(!snapshot.decide("bob", "/v1/content/42/history", "GET"));
        assert!(snapshot.decide("anonymous", "/v1/public/a/b", "GET"));
        assert!(!snapshot.decide("carol", "/v1/content/42", "GET"));
        assert_eq!(snapshot.version(), 2);
    }

    #[tokio::test]
    async fn test_rules_outside_the_model_are_indexed_not_evaluated() {
        let wide = PolicyRule::new("p", ["alice", "/x", "GET", "extra"]).unwrap();
        let snapshot = PolicySnapshot::build(PolicyModel::from_rules([wide.clone()]), 1)
            .await
            .unwrap();

        assert!(snapshot.model().contains(&wide));
        assert!(!snapshot.decide("alice", "/x", "GET"));
    }

    #[tokio::test]
    async fn test_empty_snapshot_denies() {
        let snapshot = PolicySnapshot::empty().await.unwrap();
        assert!(snapshot.model().is_empty());
        assert!(!snapshot.decide("anonymous", "/", "GET"));
    }
}
