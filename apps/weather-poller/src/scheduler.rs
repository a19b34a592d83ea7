//! Poll loop: fetch, persist, wait, with interval growth after sustained
//! fetch failures.

use crate::clock::{self, WaitOutcome};
use crate::error::PersistError;
use crate::fetch::ReadingSource;
use crate::reading::Reading;
use crate::shutdown::ShutdownCoordinator;
use crate::store::ReadingStore;
use std::sync::Arc;
use std::time::Duration;

pub const BACKOFF_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_interval: Duration,
    pub max_interval: Duration,
    /// Consecutive failures per growth step.
    pub threshold: u32,
}

impl BackoffPolicy {
    pub fn new(base_interval: Duration, max_interval: Duration) -> Self {
        Self {
            base_interval,
            max_interval: max_interval.max(base_interval),
            threshold: BACKOFF_THRESHOLD,
        }
    }

    /// +10%, never past the cap and never below the current value.
    fn grow(&self, interval: Duration) -> Duration {
        let grown = interval.saturating_add(interval / 10);
        grown.min(self.max_interval).max(interval)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    pub current_interval: Duration,
    pub consecutive_error_count: u32,
    policy: BackoffPolicy,
}

impl PollState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current_interval: policy.base_interval,
            consecutive_error_count: 0,
            policy,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_error_count = 0;
        self.current_interval = self.policy.base_interval;
    }

    /// Counts a failed fetch. Returns the new interval when this failure
    /// completes a run of `threshold` consecutive failures.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.consecutive_error_count = self.consecutive_error_count.saturating_add(1);
        if self.policy.threshold == 0 || self.consecutive_error_count % self.policy.threshold != 0
        {
            return None;
        }
        self.current_interval = self.policy.grow(self.current_interval);
        Some(self.current_interval)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub cycles: u64,
    pub successes: u64,
    pub failures: u64,
}

pub struct PollScheduler<S> {
    source: S,
    store: Arc<ReadingStore>,
    shutdown: ShutdownCoordinator,
    state: PollState,
}

impl<S: ReadingSource> PollScheduler<S> {
    pub fn new(
        source: S,
        store: Arc<ReadingStore>,
        policy: BackoffPolicy,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        Self {
            source,
            store,
            shutdown,
            state: PollState::new(policy),
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub async fn run(mut self) -> SchedulerReport {
        let mut report = SchedulerReport::default();
        tracing::info!(
            interval_secs = self.state.current_interval.as_secs(),
            "weather poller started"
        );

        while !self.shutdown.is_shutdown() {
            report.cycles += 1;
            // Dropping the in-flight fetch cancels its requests.
            let fetched = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutdown requested during fetch, abandoning it");
                    break;
                }
                res = self.source.fetch_and_normalize() => res,
            };
            match fetched {
                Ok(reading) => {
                    report.successes += 1;
                    self.persist(reading).await;
                    self.state.record_success();
                }
                Err(err) => {
                    report.failures += 1;
                    tracing::warn!(
                        error = %err,
                        consecutive_errors = self.state.consecutive_error_count + 1,
                        "weather fetch failed"
                    );
                    if let Some(interval) = self.state.record_failure() {
                        tracing::warn!(
                            interval_secs = interval.as_secs_f64(),
                            consecutive_errors = self.state.consecutive_error_count,
                            "poll interval increased after repeated fetch errors"
                        );
                    }
                }
            }

            if clock::wait(self.state.current_interval, &self.shutdown).await
                == WaitOutcome::Interrupted
            {
                break;
            }
        }

        tracing::info!(
            cycles = report.cycles,
            successes = report.successes,
            failures = report.failures,
            "weather poller stopped"
        );
        report
    }

    async fn persist(&self, reading: Reading) {
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || store.append(&reading))
            .await
            .unwrap_or_else(|err| Err(PersistError::Worker(err.to_string())));
        match result {
            Ok(id) => tracing::info!(id, "reading stored"),
            Err(err) => tracing::error!(error = %err, "failed to store reading"),
        }
    }
}
