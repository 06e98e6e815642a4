//! Exponential backoff retry
//!
//! `delay = min(base * 2^attempt * jitter, max)` where `jitter` is drawn from
//! `1 ± jitter_factor`. Only retryable failures are retried; anything else is
//! returned on the spot. Once `max_retries` retries are spent the last error
//! is returned unchanged.

use std::future::Future;
use std::time::Duration;

use crate::error::ApiError;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ApiError {
    fn is_retryable(&self) -> bool {
        ApiError::is_retryable(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Jitter factor, clamped to `[0, 1]`.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = if factor.is_nan() {
            0.0
        } else {
            factor.clamp(0.0, 1.0)
        };
        self
    }

    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    /// Delay before retry number `attempt + 1`. `sample` is a uniform draw
    /// from `[0, 1)`.
    pub fn backoff_delay(&self, attempt: u32, sample: f64) -> Duration {
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(63) as i32);
        let jitter = 1.0 + (sample - 0.5) * 2.0 * self.jitter_factor;
        let secs = (exponential * jitter).min(self.max_delay.as_secs_f64());
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }

    /// Run `op` with the error type's own retry classification.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with(op, E::is_retryable, |attempt, err, delay| {
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after transient failure"
            );
        })
        .await
    }

    /// Run `op` with an explicit retry predicate and a hook called before
    /// each sleep with `(retry_number, error, delay)`.
    pub async fn run_with<T, E, F, Fut, P, R>(
        &self,
        mut op: F,
        is_retryable: P,
        mut on_retry: R,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        R: FnMut(u32, &E, Duration),
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_retries || !is_retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.backoff_delay(attempt, rand::random::<f64>());
                    on_retry(attempt + 1, &err, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(2))
    }

    fn server_error() -> ApiError {
        ApiError::Http {
            status: 503,
            kind: crate::error::ErrorKind::ServiceUnavailable,
            message: "unavailable".into(),
            details: None,
        }
    }

    #[test]
    fn backoff_doubles_without_jitter() {
        let policy = RetryPolicy::default().with_jitter(0.0);
        assert_eq!(policy.backoff_delay(0, 0.9), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1, 0.1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3, 0.5), Duration::from_millis(800));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(10, 0.99), Duration::from_millis(5000));
        assert_eq!(policy.backoff_delay(200, 0.5), Duration::from_millis(5000));
    }

    #[test]
    fn jitter_stays_within_factor() {
        let policy = RetryPolicy::default().with_jitter(0.1);
        let low = policy.backoff_delay(2, 0.0);
        let high = policy.backoff_delay(2, 0.999_999);
        assert!(low >= Duration::from_millis(359) && low <= Duration::from_millis(361));
        assert!(high >= Duration::from_millis(439) && high <= Duration::from_millis(441));
    }

    #[test]
    fn jitter_factor_is_clamped() {
        assert_eq!(RetryPolicy::default().with_jitter(3.0).jitter_factor(), 1.0);
        assert_eq!(RetryPolicy::default().with_jitter(-1.0).jitter_factor(), 0.0);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<&str, ApiError> = fast_policy(3)
            .run(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ApiError::Network("reset".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), ApiError> = fast_policy(3)
            .run(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ApiError::Http {
                        status: 404,
                        kind: crate::error::ErrorKind::NotFound,
                        message: "missing".into(),
                        details: None,
                    })
                }
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut retries_seen = Vec::new();

        let result: Result<(), ApiError> = fast_policy(2)
            .run_with(
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(server_error())
                    }
                },
                ApiError::is_retryable,
                |attempt, _err, _delay| retries_seen.push(attempt),
            )
            .await;

        assert_eq!(result.unwrap_err().status(), 503);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries_seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn no_retry_policy_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), ApiError> = RetryPolicy::none()
            .run(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ApiError::Timeout)
                }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
