//! Exponential backoff for retryable stage and provider failures.
//!
//! Defaults match the stage retry budget: base interval 1s, factor 2, capped
//! at 60s, with jitter to avoid every retrying caller waking up in lockstep.

use rand::Rng;
use std::time::Duration;

/// Governs how long to wait between retry attempts and how many to allow.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: usize,
    pub initial_interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_interval: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(60),
            jitter: true,
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retrying the `attempt`th failure (0-indexed).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let base = self.initial_interval.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_interval.as_secs_f64());
        let final_secs = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..=1.5);
            capped * factor
        } else {
            capped
        };
        Duration::from_secs_f64(final_secs)
    }

    /// Whether another attempt is allowed after `attempts` failures so far.
    pub fn should_retry(&self, attempts: usize) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    /// Stage retry budget default: 3 attempts, 1s base, factor 2, 60s cap, jitter on.
    fn default() -> Self {
        Self::new(3)
    }
}

/// Tracks attempts and the most recent failure for one retryable operation.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    pub attempts: usize,
    pub last_error: Option<String>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&mut self, error: Option<String>) {
        self.attempts += 1;
        self.last_error = error;
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_error = None;
    }
}

/// Run `op` until it succeeds, exhausts `policy`'s attempt budget, or returns
/// a non-retryable error (per `is_retryable`). Sleeps between attempts using
/// `policy`'s backoff schedule.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) && policy.should_retry(attempt + 1) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, ?delay, "retrying after failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_stage_retry_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_interval, Duration::from_secs(1));
        assert_eq!(policy.backoff_factor, 2.0);
        assert_eq!(policy.max_interval, Duration::from_secs(60));
        assert!(policy.jitter);
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy::new(5).with_jitter(false);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(6), Duration::from_secs(60));
    }

    #[test]
    fn should_retry_respects_attempt_budget() {
        let policy = RetryPolicy::new(3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[tokio::test]
    async fn retry_with_backoff_stops_on_non_retryable_error() {
        let policy = RetryPolicy::new(3).with_initial_interval(Duration::from_millis(1));
        let mut calls = 0;
        let result: Result<(), &str> = retry_with_backoff(
            &policy,
            |_err: &&str| false,
            || {
                calls += 1;
                std::future::ready(Err("permanent"))
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_with_backoff_exhausts_budget() {
        let policy = RetryPolicy::new(3).with_initial_interval(Duration::from_millis(1));
        let mut calls = 0;
        let result: Result<(), &str> = retry_with_backoff(
            &policy,
            |_err: &&str| true,
            || {
                calls += 1;
                std::future::ready(Err("transient"))
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
