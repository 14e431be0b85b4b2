//! Replication client adapter.
//!
//! `GrpcPolicyAdapter` implements [`PolicyAdapter`] against a remote
//! `PolicyReplication` service. The channel is created on first use and then
//! shared; tonic channels are cheap to clone and reconnect internally.

use async_trait::async_trait;
use common::policy::{PolicyAdapter, PolicyError, PolicyRule, RuleFilter, Section};
use proto_gen::policy::policy_replication_client::PolicyReplicationClient;
use proto_gen::policy::{Empty, FilteredPolicyRequest, Policies, PolicyRequest};
use std::time::Duration;
use tokio::sync::OnceCell;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tracing::instrument;

/// Default timeout for a replication RPC.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Replication client settings.
#[derive(Debug, Clone)]
pub struct ReplicationClientConfig {
    /// Server address, e.g. `http://policy-service:50061`.
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub rpc_timeout: Duration,
}

impl ReplicationClientConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

/// [`PolicyAdapter`] backed by the replication service.
pub struct GrpcPolicyAdapter {
    config: ReplicationClientConfig,
    client: OnceCell<PolicyReplicationClient<Channel>>,
}

impl GrpcPolicyAdapter {
    /// Validates the endpoint; no connection is made until the first call.
    ///
    /// # Errors
    ///
    /// `Replication` when the endpoint is not a valid URI.
    pub fn new(config: ReplicationClientConfig) -> Result<Self, PolicyError> {
        Endpoint::from_shared(config.endpoint.clone()).map_err(|e| {
            PolicyError::Replication(format!("invalid policy service endpoint: {e}"))
        })?;

        Ok(Self {
            config,
            client: OnceCell::new(),
        })
    }

    /// Connected client. A failed connection is retried on the next call.
    async fn client(&self) -> Result<PolicyReplicationClient<Channel>, PolicyError> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let channel = Endpoint::from_shared(self.config.endpoint.clone())
                    .map_err(|e| PolicyError::Replication(format!("invalid endpoint: {e}")))?
                    .connect_timeout(self.config.connect_timeout)
                    .timeout(self.config.rpc_timeout)
                    .connect()
                    .await
                    .map_err(|e| {
                        tracing::warn!(
                            target: "gateway.policy.adapter",
                            error = %e,
                            endpoint = %self.config.endpoint,
                            "Failed to connect to policy service"
                        );
                        PolicyError::Replication(format!("connect failed: {e}"))
                    })?;

                tracing::info!(
                    target: "gateway.policy.adapter",
                    endpoint = %self.config.endpoint,
                    "Connected to policy service"
                );
                Ok::<_, PolicyError>(PolicyReplicationClient::new(channel))
            })
            .await?;

        Ok(client.clone())
    }
}

/// Map an RPC failure. Rejected input keeps its meaning, everything else is
/// a replication failure.
fn status_to_error(method: &'static str, status: &Status) -> PolicyError {
    tracing::warn!(
        target: "gateway.policy.adapter",
        method,
        code = ?status.code(),
        message = %status.message(),
        "Replication RPC failed"
    );
    match status.code() {
        Code::InvalidArgument => PolicyError::InvalidRule(status.message().to_string()),
        code => PolicyError::Replication(format!("{method} returned {code:?}")),
    }
}

#[async_trait]
impl PolicyAdapter for GrpcPolicyAdapter {
    #[instrument(skip_all)]
    async fn load_policy(&self) -> Result<Vec<PolicyRule>, PolicyError> {
        let policies = self
            .client()
            .await?
            .load_policy(Empty {})
            .await
            .map_err(|s| status_to_error("LoadPolicy", &s))?
            .into_inner();

        policies.into_rules()
    }

    #[instrument(skip_all, fields(rule_count = rules.len()))]
    async fn save_policy(&self, rules: &[PolicyRule]) -> Result<(), PolicyError> {
        self.client()
            .await?
            .save_policy(Policies::from_rules(rules))
            .await
            .map_err(|s| status_to_error("SavePolicy", &s))?;
        Ok(())
    }

    #[instrument(skip_all, fields(sec = %sec))]
    async fn add_policy(&self, sec: Section, rule: &PolicyRule) -> Result<(), PolicyError> {
        sec.ensure_matches(rule.ptype())?;
        self.client()
            .await?
            .add_policy(PolicyRequest::new(sec, rule))
            .await
            .map_err(|s| status_to_error("AddPolicy", &s))?;
        Ok(())
    }

    #[instrument(skip_all, fields(sec = %sec))]
    async fn remove_policy(&self, sec: Section, rule: &PolicyRule) -> Result<(), PolicyError> {
        sec.ensure_matches(rule.ptype())?;
        self.client()
            .await?
            .remove_policy(PolicyRequest::new(sec, rule))
            .await
            .map_err(|s| status_to_error("RemovePolicy", &s))?;
        Ok(())
    }

    #[instrument(skip_all, fields(sec = %sec, field_index = filter.field_index()))]
    async fn remove_filtered_policy(
        &self,
        sec: Section,
        filter: &RuleFilter,
    ) -> Result<(), PolicyError> {
        sec.ensure_matches(filter.ptype())?;
        self.client()
            .await?
            .remove_filtered_policy(FilteredPolicyRequest::new(sec, filter))
            .await
            .map_err(|s| status_to_error("RemoveFilteredPolicy", &s))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_endpoint_is_rejected_at_construction() {
        let result = GrpcPolicyAdapter::new(ReplicationClientConfig::new("not a uri"));
        assert!(matches!(result, Err(PolicyError::Replication(_))));
    }

    #[test]
    fn test_status_mapping() {
        let invalid = status_to_error("AddPolicy", &Status::invalid_argument("field v0 is empty"));
        assert_eq!(invalid, PolicyError::InvalidRule("field v0 is empty".to_string()));

        let internal = status_to_error("LoadPolicy", &Status::internal("db down"));
        assert!(matches!(internal, PolicyError::Replication(ref m) if !m.contains("db down")));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_replication_error() {
        let mut config = ReplicationClientConfig::new("http://127.0.0.1:1");
        config.connect_timeout = Duration::from_millis(200);
        let adapter = GrpcPolicyAdapter::new(config).unwrap();

        let result = adapter.load_policy().await;
        assert!(matches!(result, Err(PolicyError::Replication(_))));
    }

    #[tokio::test]
    async fn test_section_mismatch_fails_before_any_call() {
        let adapter = GrpcPolicyAdapter::new(ReplicationClientConfig::new("http://127.0.0.1:1")).unwrap();
        let rule = PolicyRule::new("g", ["bob", "editor"]).unwrap();

        let result = adapter.add_policy(Section::Policy, &rule).await;
        assert!(matches!(result, Err(PolicyError::InvalidRule(_))));
    }
}
