//! Observability for the policy service.

pub mod metrics;

pub use metrics::{init_metrics_recorder, record_db_query, record_rpc};
