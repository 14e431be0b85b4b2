//! Policy service metrics.
//!
//! All metrics use the `policy_` prefix. Labels are bounded:
//! - `method`: the five replication RPCs
//! - `operation`: one value per repository query
//! - `status`: success, invalid, error

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used to render
/// the scrape endpoint.
///
/// # Errors
///
/// Returns error if a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("policy_rpc".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
            ],
        )
        .map_err(|e| format!("Failed to set RPC buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("policy_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Metrics: `policy_rpc_requests_total`, `policy_rpc_duration_seconds`
/// Labels: `method`, `status`
pub fn record_rpc(method: &'static str, status: &'static str, duration: Duration) {
    counter!("policy_rpc_requests_total", "method" => method, "status" => status).increment(1);
    histogram!("policy_rpc_duration_seconds", "method" => method)
        .record(duration.as_secs_f64());
}

/// Metrics: `policy_db_queries_total`, `policy_db_query_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &'static str, status: &'static str, duration: Duration) {
    counter!("policy_db_queries_total", "operation" => operation, "status" => status)
        .increment(1);
    histogram!("policy_db_query_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}
