//! gRPC service for policy replication.
//!
//! Implements `gatekeeper.policy.PolicyReplication`. Gateways call
//! `LoadPolicy` on every reload and forward rule mutations here.
//!
//! # Errors on the wire
//!
//! - Malformed rules, sections and filters: `INVALID_ARGUMENT` with the
//!   validation message
//! - Store failures: `INTERNAL` with a generic message; details are logged

use crate::observability::metrics;
use crate::store::PolicyStore;
use common::policy::PolicyError;
use proto_gen::policy::{
    policy_replication_server::PolicyReplication, Empty, FilteredPolicyRequest, Policies,
    PolicyRequest,
};
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};
use tracing::instrument;

/// Replication server over any [`PolicyStore`].
pub struct PolicyReplicationService<S: PolicyStore> {
    store: Arc<S>,
}

impl<S: PolicyStore> PolicyReplicationService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

/// Map a policy error to a status, recording the call.
fn to_status(method: &'static str, start: Instant, err: PolicyError) -> Status {
    match err {
        PolicyError::InvalidRule(message) => {
            metrics::record_rpc(method, "invalid", start.elapsed());
            tracing::debug!(target: "policy.grpc", method, reason = %message, "Rejected request");
            Status::invalid_argument(message)
        }
        other => {
            metrics::record_rpc(method, "error", start.elapsed());
            tracing::error!(target: "policy.grpc", method, error = %other, "Store operation failed");
            Status::internal("Policy store operation failed")
        }
    }
}

fn respond<T>(method: &'static str, start: Instant, message: T) -> Response<T> {
    metrics::record_rpc(method, "success", start.elapsed());
    Response::new(message)
}

#[tonic::async_trait]
impl<S: PolicyStore> PolicyReplication for PolicyReplicationService<S> {
    #[instrument(skip_all)]
    async fn load_policy(&self, _request: Request<Empty>) -> Result<Response<Policies>, Status> {
        const METHOD: &str = "load_policy";
        let start = Instant::now();

        let rules = self
            .store
            .load_policy()
            .await
            .map_err(|e| to_status(METHOD, start, e))?;

        tracing::debug!(target: "policy.grpc", rules = rules.len(), "Policy loaded");
        Ok(respond(METHOD, start, Policies::from_rules(&rules)))
    }

    #[instrument(skip_all, fields(rules = request.get_ref().policies.len()))]
    async fn save_policy(&self, request: Request<Policies>) -> Result<Response<Empty>, Status> {
        const METHOD: &str = "save_policy";
        let start = Instant::now();

        let rules = request
            .into_inner()
            .into_rules()
            .map_err(|e| to_status(METHOD, start, e))?;

        self.store
            .save_policy(&rules)
            .await
            .map_err(|e| to_status(METHOD, start, e))?;

        tracing::info!(target: "policy.grpc", rules = rules.len(), "Policy saved");
        Ok(respond(METHOD, start, Empty {}))
    }

    #[instrument(skip_all, fields(sec = %request.get_ref().sec, ptype = %request.get_ref().ptype))]
    async fn add_policy(&self, request: Request<PolicyRequest>) -> Result<Response<Empty>, Status> {
        const METHOD: &str = "add_policy";
        let start = Instant::now();

        let (sec, rule) = request
            .into_inner()
            .into_parts()
            .map_err(|e| to_status(METHOD, start, e))?;

        self.store
            .add_policy(sec, &rule)
            .await
            .map_err(|e| to_status(METHOD, start, e))?;

        tracing::info!(target: "policy.grpc", sec = %sec, ptype = %rule.ptype(), "Rule added");
        Ok(respond(METHOD, start, Empty {}))
    }

    #[instrument(skip_all, fields(sec = %request.get_ref().sec, ptype = %request.get_ref().ptype))]
    async fn remove_policy(
        &self,
        request: Request<PolicyRequest>,
    ) -> Result<Response<Empty>, Status> {
        const METHOD: &str = "remove_policy";
        let start = Instant::now();

        let (sec, rule) = request
            .into_inner()
            .into_parts()
            .map_err(|e| to_status(METHOD, start, e))?;

        self.store
            .remove_policy(sec, &rule)
            .await
            .map_err(|e| to_status(METHOD, start, e))?;

        tracing::info!(target: "policy.grpc", sec = %sec, ptype = %rule.ptype(), "Rule removed");
        Ok(respond(METHOD, start, Empty {}))
    }

    #[instrument(
        skip_all,
        fields(
            sec = %request.get_ref().sec,
            ptype = %request.get_ref().ptype,
            field_index = request.get_ref().field_index
        )
    )]
    async fn remove_filtered_policy(
        &self,
        request: Request<FilteredPolicyRequest>,
    ) -> Result<Response<Empty>, Status> {
        const METHOD: &str = "remove_filtered_policy";
        let start = Instant::now();

        let (sec, filter) = request
            .into_inner()
            .into_parts()
            .map_err(|e| to_status(METHOD, start, e))?;

        self.store
            .remove_filtered_policy(sec, &filter)
            .await
            .map_err(|e| to_status(METHOD, start, e))?;

        tracing::info!(
            target: "policy.grpc",
            sec = %sec,
            ptype = %filter.ptype(),
            field_index = filter.field_index(),
            "Filtered rules removed"
        );
        Ok(respond(METHOD, start, Empty {}))
    }
}
