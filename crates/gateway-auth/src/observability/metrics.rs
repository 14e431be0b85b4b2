//! Gateway auth metrics.
//!
//! Prefix `gateway_`. Labels are bounded:
//! - `outcome`: valid, invalid, key_unavailable
//! - `status`: success, error, timeout
//! - `decision`: allow, deny
//!
//! Recording is a no-op until the embedding service installs a recorder.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metric: `gateway_token_verifications_total`
/// Labels: `outcome`
pub fn record_token_verification(outcome: &'static str) {
    counter!("gateway_token_verifications_total", "outcome" => outcome).increment(1);
}

/// Metric: `gateway_jwks_fetch_total`
/// Labels: `status`
pub fn record_jwks_fetch(status: &'static str) {
    counter!("gateway_jwks_fetch_total", "status" => status).increment(1);
}

/// Metrics: `gateway_policy_reloads_total`, `gateway_policy_reload_duration_seconds`,
/// and on success `gateway_policy_rules`.
pub fn record_policy_reload(status: &'static str, duration: Duration, rule_count: Option<usize>) {
    counter!("gateway_policy_reloads_total", "status" => status).increment(1);
    histogram!("gateway_policy_reload_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    if let Some(count) = rule_count {
        #[allow(clippy::cast_precision_loss)]
        gauge!("gateway_policy_rules").set(count as f64);
    }
}

/// Metric: `gateway_authz_decisions_total`
/// Labels: `decision`
pub fn record_authz_decision(allowed: bool) {
    let decision = if allowed { "allow" } else { "deny" };
    counter!("gateway_authz_decisions_total", "decision" => decision).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(recorder: &DebuggingRecorder, name: &str, label: (&str, &str)) -> Option<u64> {
        recorder
            .snapshotter()
            .snapshot()
            .into_vec()
            .into_iter()
            .find_map(|(key, _, _, value)| {
                let key = key.key();
                let labelled = key
                    .labels()
                    .any(|l| l.key() == label.0 && l.value() == label.1);
                match value {
                    DebugValue::Counter(v) if key.name() == name && labelled => Some(v),
                    _ => None,
                }
            })
    }

    #[test]
    fn test_decisions_are_counted_by_label() {
        let recorder = DebuggingRecorder::new();

        metrics::with_local_recorder(&recorder, || {
            record_authz_decision(true);
            record_authz_decision(false);
            record_authz_decision(false);
        });

        assert_eq!(
            counter_value(&recorder, "gateway_authz_decisions_total", ("decision", "allow")),
            Some(1)
        );
        assert_eq!(
            counter_value(&recorder, "gateway_authz_decisions_total", ("decision", "deny")),
            Some(2)
        );
    }

    #[test]
    fn test_reload_records_counter_histogram_and_gauge() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_policy_reload("success", Duration::from_millis(12), Some(7));
            record_policy_reload("error", Duration::from_millis(3), None);
        });

        assert_eq!(
            counter_value(&recorder, "gateway_policy_reloads_total", ("status", "error")),
            Some(1)
        );

        let snapshot = snapshotter.snapshot().into_vec();
        let gauge = snapshot.iter().find_map(|(key, _, _, value)| match value {
            DebugValue::Gauge(v) if key.key().name() == "gateway_policy_rules" => Some(v.into_inner()),
            _ => None,
        });
        assert_eq!(gauge, Some(7.0));

        assert!(snapshot.iter().any(|(key, _, _, value)| {
            key.key().name() == "gateway_policy_reload_duration_seconds"
                && matches!(value, DebugValue::Histogram(_))
        }));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_token_verification("valid");
        record_jwks_fetch("error");
    }
}
