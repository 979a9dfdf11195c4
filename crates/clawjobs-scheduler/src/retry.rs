//! Whole-job retry with exponential backoff.
//!
//! A job is retried only when its failure is marked retryable. Every
//! attempt writes its own run record, so a job that fails twice and then
//! succeeds leaves three records.

use std::future::Future;
use std::time::Duration;

use clawjobs_core::config::SchedulerConfig;

use crate::executor::JobFailure;

/// Retry budget for one job request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_secs(config.initial_backoff_secs),
        }
    }

    /// Wait after the `attempt`-th failure (1-based): 30s, 60s, 120s, …
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exp)
    }
}

/// Run `op` until it succeeds, fails fatally, or the budget is spent.
/// `op` receives the 1-based attempt number.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, JobFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, JobFailure>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(failure) if failure.retryable && attempt < policy.max_attempts => {
                let wait = policy.backoff_for(attempt);
                tracing::warn!(
                    "🔄 Attempt {}/{} failed: {} (retrying in {}s)",
                    attempt,
                    policy.max_attempts,
                    failure.message,
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(failure) => {
                if failure.retryable {
                    tracing::error!(
                        "❌ Giving up after {} attempts: {}",
                        attempt,
                        failure.message
                    );
                }
                return Err(failure);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn failure(retryable: bool) -> JobFailure {
        JobFailure {
            message: "boom".into(),
            run_id: None,
            retryable,
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(30));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(60));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(120));
    }

    #[test]
    fn test_from_config_keeps_at_least_one_attempt() {
        let config = SchedulerConfig {
            max_attempts: 0,
            initial_backoff_secs: 5,
            ..SchedulerConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_backoff, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failures_exhaust_budget() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<(), _> = run_with_retry(&RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(failure(true)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry(&RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(failure(false)) }
        })
        .await;

        assert!(!result.unwrap_err().retryable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry() {
        let result = run_with_retry(&RetryPolicy::default(), |attempt| async move {
            if attempt < 2 {
                Err(failure(true))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }
}
