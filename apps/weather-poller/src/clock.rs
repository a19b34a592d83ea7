use crate::shutdown::ShutdownCoordinator;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    Interrupted,
}

/// Sleeps for `duration` unless shutdown is requested first. Shutdown wakes
/// the waiter immediately, whatever the remaining duration.
pub async fn wait(duration: Duration, shutdown: &ShutdownCoordinator) -> WaitOutcome {
    if shutdown.is_shutdown() {
        return WaitOutcome::Interrupted;
    }
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => WaitOutcome::Interrupted,
        _ = tokio::time::sleep(duration) => WaitOutcome::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn completes_after_full_duration() {
        let shutdown = ShutdownCoordinator::new();
        let started = Instant::now();

        let outcome = wait(Duration::from_secs(30), &shutdown).await;

        assert_eq!(outcome, WaitOutcome::Completed);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed <= Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_wait_is_observed_within_one_second() {
        let shutdown = ShutdownCoordinator::new();
        let started = Instant::now();

        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { wait(Duration::from_secs(100), &shutdown).await })
        };
        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown.signal_shutdown();

        let outcome = waiter.await.expect("waiter task");
        assert_eq!(outcome, WaitOutcome::Interrupted);
        assert!(started.elapsed() <= Duration::from_secs(4));
    }

    #[tokio::test]
    async fn already_signalled_returns_without_sleeping() {
        let shutdown = ShutdownCoordinator::new();
        shutdown.signal_shutdown();

        let started = std::time::Instant::now();
        let outcome = wait(Duration::from_secs(3600), &shutdown).await;

        assert_eq!(outcome, WaitOutcome::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
