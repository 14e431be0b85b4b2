//! Observability for the gateway auth layer.

pub mod metrics;
