//! Bounded retry with exponential backoff
//!
//! Every remote call in the pipeline (file transfers, folder and link
//! creation, order metadata writes) goes through a [`RetryPolicy`]. The
//! policy decides from the error's [`RetryClass`] whether another attempt is
//! worthwhile, and honors a server-supplied `Retry-After` as a lower bound
//! on the wait.

use crate::config::RetryConfig;
use crate::domain::{Result, RetryClass, RouteError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Decides whether an error is retryable
pub type Classifier = fn(&RouteError) -> RetryClass;

/// Retry policy shared by all remote operations
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: Duration,
    classify: Classifier,
}

impl RetryPolicy {
    /// Create a policy with no jitter that retries transient errors
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            multiplier: multiplier.max(1.0),
            jitter: Duration::ZERO,
            classify: RouteError::retry_class,
        }
    }

    /// Build the policy from the `[retry]` section
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.backoff_multiplier,
        )
        .with_jitter(Duration::from_millis(config.jitter_ms))
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Add up to `jitter` of random delay to each computed backoff
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the retryable predicate
    pub fn with_classifier(mut self, classify: Classifier) -> Self {
        self.classify = classify;
        self
    }

    /// Use a different attempt cap with the same backoff
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Exponential backoff after the given failed attempt (1-based), capped
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Wait before the next attempt
    ///
    /// A `Retry-After` hint is a floor: the wait is never shorter than the
    /// hint, and never shorter than the computed backoff.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff_for(attempt) + self.random_jitter();
        match retry_after {
            Some(hint) => hint.max(backoff),
            None => backoff,
        }
    }

    fn random_jitter(&self) -> Duration {
        let max = self.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// cap is reached. The last error is returned.
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let retry_after = match (self.classify)(&e) {
                        RetryClass::Permanent => {
                            tracing::debug!(operation = %name, error = %e, "Permanent failure, not retrying");
                            return Err(e);
                        }
                        RetryClass::Transient { retry_after } => retry_after,
                    };

                    if attempt >= self.max_attempts {
                        tracing::warn!(
                            operation = %name,
                            attempts = attempt,
                            error = %e,
                            "Retry attempts exhausted"
                        );
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt, retry_after);
                    crate::log_retry_attempt!(
                        name,
                        attempt,
                        self.max_attempts,
                        delay.as_millis() as u64,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(5),
            2.0,
        )
    }

    fn rate_limited() -> RouteError {
        StoreError::RateLimited {
            retry_after: None,
            message: "too_many_requests".to_string(),
        }
        .into()
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::new(
            5,
            Duration::from_secs(1),
            Duration::from_secs(30),
            2.0,
        );
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_after_is_a_floor() {
        let policy = RetryPolicy::new(
            5,
            Duration::from_secs(1),
            Duration::from_secs(30),
            2.0,
        );
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(10))),
            Duration::from_secs(10)
        );
        // A hint shorter than the backoff does not shorten the wait
        assert_eq!(
            policy.delay_for(3, Some(Duration::from_millis(100))),
            Duration::from_secs(4)
        );
        // The hint may exceed the backoff cap
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(60))),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = fast_policy(3).with_jitter(Duration::from_millis(10));
        for _ in 0..50 {
            let d = policy.delay_for(1, None);
            assert!(d >= Duration::from_millis(1));
            assert!(d <= Duration::from_millis(11));
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = fast_policy(5)
            .run("upload", || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(rate_limited())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_attempt_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = fast_policy(4)
            .run("upload", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = fast_policy(5)
            .run("create_folder", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::AuthenticationFailed("expired".to_string()).into())
                }
            })
            .await;

        assert!(matches!(result, Err(RouteError::Store(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        fn never(_: &RouteError) -> RetryClass {
            RetryClass::Permanent
        }

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = fast_policy(5)
            .with_classifier(never)
            .run("note", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_retry_after() {
        let start = tokio::time::Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = fast_policy(3)
            .run("upload", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StoreError::RateLimited {
                            retry_after: Some(Duration::from_secs(7)),
                            message: "slow down".to_string(),
                        }
                        .into())
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(7));
    }
}
