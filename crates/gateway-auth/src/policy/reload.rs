//! Periodic policy reload.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token fires, including in the middle
//! of a reload. A cancelled reload leaves the previous snapshot in place.

use crate::observability::metrics;
use crate::policy::enforcer::PolicyEnforcer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Default interval between reloads.
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(10);

/// Default bound on a single reload.
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSchedule {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ReloadSchedule {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RELOAD_INTERVAL,
            timeout: DEFAULT_RELOAD_TIMEOUT,
        }
    }
}

/// Handle to the background reload task.
#[derive(Debug)]
pub struct AutoReloadScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl AutoReloadScheduler {
    /// Spawn the reload loop. The first reload happens one interval from now.
    #[must_use]
    pub fn spawn(
        enforcer: Arc<PolicyEnforcer>,
        schedule: ReloadSchedule,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(run_reload_loop(enforcer, schedule, cancel.clone()));
        Self { cancel, handle }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(target: "gateway.policy.reload", error = %e, "Reload task ended abnormally");
        }
    }
}

#[instrument(skip_all, name = "gateway.policy.reload_loop")]
async fn run_reload_loop(
    enforcer: Arc<PolicyEnforcer>,
    schedule: ReloadSchedule,
    cancel: CancellationToken,
) {
    tracing::info!(
        target: "gateway.policy.reload",
        interval_secs = schedule.interval.as_secs(),
        timeout_secs = schedule.timeout.as_secs(),
        "Starting policy reload task"
    );

    let mut interval = tokio::time::interval_at(Instant::now() + schedule.interval, schedule.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            () = cancel.cancelled() => break,
        }

        let started = std::time::Instant::now();
        tokio::select! {
            result = tokio::time::timeout(schedule.timeout, enforcer.reload()) => match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // already logged by the enforcer; retried on the next tick
                    tracing::debug!(target: "gateway.policy.reload", error = %e, "Scheduled reload failed");
                }
                Err(_) => {
                    metrics::record_policy_reload("timeout", started.elapsed(), None);
                    tracing::warn!(
                        target: "gateway.policy.reload",
                        timeout_secs = schedule.timeout.as_secs(),
                        "Scheduled reload timed out"
                    );
                }
            },
            () = cancel.cancelled() => break,
        }
    }

    tracing::info!(target: "gateway.policy.reload", "Policy reload task stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::policy::enforcer::{EnforcerConfig, EnforcerState};
    use crate::policy::test_support::{p, TestAdapter};

    async fn ready_enforcer(adapter: &Arc<TestAdapter>) -> Arc<PolicyEnforcer> {
        PolicyEnforcer::initialize(adapter.clone(), EnforcerConfig::default())
            .await
            .unwrap()
    }

    #[test]
    fn test_default_schedule() {
        let schedule = ReloadSchedule::default();
        assert_eq!(schedule.interval, Duration::from_secs(10));
        assert_eq!(schedule.timeout, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_publishes_new_rules() {
        let adapter = Arc::new(TestAdapter::with_rules(vec![p("alice", "/a", "GET")]));
        let enforcer = ready_enforcer(&adapter).await;
        let mut published = enforcer.subscribe();

        let scheduler = AutoReloadScheduler::spawn(
            Arc::clone(&enforcer),
            ReloadSchedule::default(),
            CancellationToken::new(),
        );
        adapter.set_rules(vec![p("bob", "/b", "GET")]);

        tokio::time::timeout(Duration::from_secs(11), published.changed())
            .await
            .unwrap()
            .unwrap();

        assert!(enforcer.decide("bob", "/b", "GET"));
        assert!(!enforcer.decide("alice", "/a", "GET"));
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reload_before_first_interval() {
        let adapter = Arc::new(TestAdapter::default());
        let enforcer = ready_enforcer(&adapter).await;
        let scheduler = AutoReloadScheduler::spawn(
            enforcer,
            ReloadSchedule::default(),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(adapter.load_count(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_retried_next_tick() {
        let adapter = Arc::new(TestAdapter::with_rules(vec![p("alice", "/a", "GET")]));
        let enforcer = ready_enforcer(&adapter).await;
        let before = enforcer.snapshot().version();
        let mut published = enforcer.subscribe();

        adapter.set_failing(true);
        let scheduler = AutoReloadScheduler::spawn(
            Arc::clone(&enforcer),
            ReloadSchedule::default(),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(adapter.load_count() >= 3);
        assert_eq!(enforcer.snapshot().version(), before);
        assert_eq!(enforcer.state(), EnforcerState::Ready);
        assert!(enforcer.decide("alice", "/a", "GET"));
        assert!(scheduler.is_running());

        adapter.set_failing(false);
        tokio::time::timeout(Duration::from_secs(11), published.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(enforcer.snapshot().version() > before);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_reload_is_bounded_by_timeout() {
        let adapter = Arc::new(TestAdapter::with_rules(vec![p("alice", "/a", "GET")]));
        let enforcer = ready_enforcer(&adapter).await;
        let before = enforcer.snapshot().version();

        adapter.set_load_delay(Some(Duration::from_secs(60)));
        let scheduler = AutoReloadScheduler::spawn(
            Arc::clone(&enforcer),
            ReloadSchedule {
                interval: Duration::from_secs(10),
                timeout: Duration::from_secs(2),
            },
            CancellationToken::new(),
        );

        // ticks at 10s and 20s, each abandoned after 2s
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(adapter.load_count(), 3);
        assert_eq!(enforcer.snapshot().version(), before);
        assert_eq!(enforcer.state(), EnforcerState::Ready);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_running_reload() {
        let adapter = Arc::new(TestAdapter::default());
        let enforcer = ready_enforcer(&adapter).await;
        adapter.set_load_delay(Some(Duration::from_secs(5)));

        let cancel = CancellationToken::new();
        let scheduler = AutoReloadScheduler::spawn(
            Arc::clone(&enforcer),
            ReloadSchedule::default(),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(enforcer.state(), EnforcerState::Reloading);

        let started = Instant::now();
        scheduler.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(cancel.is_cancelled());
        assert_eq!(enforcer.state(), EnforcerState::Ready);
    }
}
