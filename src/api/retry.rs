//! Bounded, sequential retry of a single logical request.

use super::classify::{DEFAULT_RETRY_AFTER_SECS, TransportFailure, classify};
use super::error::{ClassifiedError, ErrorKind};
use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero means a single attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// `min(base * multiplier^attempt, max_delay)`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let ms = (base_ms * self.multiplier.powi(exponent)).min(max_ms);
        if ms.is_finite() && ms > 0.0 {
            Duration::from_millis(ms as u64)
        } else {
            Duration::ZERO
        }
    }

    /// Wait before the retry that follows failed attempt `attempt` (0-based).
    ///
    /// Rate-limited failures wait exactly what the server asked for.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, err: &ClassifiedError) -> Duration {
        if err.kind == ErrorKind::RateLimit {
            return Duration::from_secs(err.retry_after_secs.unwrap_or(DEFAULT_RETRY_AFTER_SECS));
        }
        self.backoff(attempt)
    }

    /// Whether another attempt should follow failed attempt `attempt` (0-based).
    #[must_use]
    pub fn should_retry(&self, err: &ClassifiedError, attempt: u32) -> bool {
        err.retryable && attempt < self.max_retries
    }
}

/// Runs an operation under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    cancel: Option<CancellationToken>,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    /// Stop waiting between attempts when `token` is cancelled. The last
    /// classified error is returned.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Swap the policy, keeping any cancellation token.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Attempt `operation` until it succeeds, fails terminally, or the retry
    /// budget is spent. Attempts never overlap.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportFailure>>,
    {
        let mut attempt = 0u32;

        loop {
            let failure = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{label} succeeded after {attempt} retries");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let err = classify(&failure);
            debug!(
                "{label} attempt {} failed: {} (status {:?})",
                attempt + 1,
                err.kind,
                err.status
            );

            if !self.policy.should_retry(&err, attempt) {
                if err.retryable {
                    warn!(
                        "{label}: {}, giving up after {} attempts",
                        err.kind,
                        attempt + 1
                    );
                }
                return Err(err);
            }

            let delay = self.policy.delay_for(attempt, &err);
            attempt += 1;
            warn!(
                "{}, retrying {label} in {}ms (attempt {}/{})",
                err.kind,
                delay.as_millis(),
                attempt,
                self.policy.max_retries
            );

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        () = token.cancelled() => {
                            debug!("{label}: retry cancelled");
                            return Err(err);
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn server_error() -> TransportFailure {
        TransportFailure::Status {
            status: 503,
            retry_after: None,
            body: None,
        }
    }

    /// Runs `failures` in order, then succeeds. Records when each attempt started.
    async fn run_script(
        executor: &RetryExecutor,
        failures: Vec<TransportFailure>,
    ) -> (Result<&'static str, ClassifiedError>, Vec<Instant>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(failures.into_iter()));
        let result = executor
            .execute("test", || {
                let calls = calls.clone();
                let script = script.clone();
                async move {
                    calls.lock().unwrap().push(Instant::now());
                    match script.lock().unwrap().next() {
                        Some(failure) => Err(failure),
                        None => Ok("ok"),
                    }
                }
            })
            .await;
        let calls = calls.lock().unwrap().clone();
        (result, calls)
    }

    fn gaps(calls: &[Instant]) -> Vec<Duration> {
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
        assert_eq!(policy.backoff(3), Duration::from_millis(8000));
        assert_eq!(policy.backoff(4), Duration::from_millis(10_000));
        assert_eq!(policy.backoff(40), Duration::from_millis(10_000));
    }

    #[test]
    fn test_rate_limit_delay_ignores_backoff() {
        let policy = RetryPolicy::default();
        let err = ClassifiedError::new(ErrorKind::RateLimit).with_retry_after(5);
        assert_eq!(policy.delay_for(3, &err), Duration::from_secs(5));

        let err = ClassifiedError::new(ErrorKind::RateLimit);
        assert_eq!(policy.delay_for(0, &err), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let (result, calls) = run_script(&executor, vec![]).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_back_off_then_fail() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let (result, calls) = run_script(&executor, vec![server_error(); 4]).await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Server);
        assert_eq!(err.status, Some(503));
        assert_eq!(calls.len(), 4);
        assert_eq!(
            gaps(&calls),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_bounded_by_max_retries() {
        for max_retries in [0, 1, 2, 5] {
            let executor = RetryExecutor::new(RetryPolicy {
                max_retries,
                ..RetryPolicy::default()
            });
            let failures = vec![
                TransportFailure::Connect {
                    detail: "refused".into()
                };
                10
            ];
            let (result, calls) = run_script(&executor, failures).await;
            assert_eq!(result.unwrap_err().kind, ErrorKind::Network);
            assert_eq!(calls.len() as u32, max_retries + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let failures = vec![
            TransportFailure::TimedOut {
                detail: "deadline".into(),
            },
            server_error(),
        ];
        let (result, calls) = run_script(&executor, failures).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_attempted_once() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_retries: 10,
            ..RetryPolicy::default()
        });
        for status in [400, 401] {
            let failure = TransportFailure::Status {
                status,
                retry_after: None,
                body: None,
            };
            let (result, calls) = run_script(&executor, vec![failure; 3]).await;
            assert!(!result.unwrap_err().retryable);
            assert_eq!(calls.len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_retry_after() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let failure = TransportFailure::Status {
            status: 429,
            retry_after: Some("5".into()),
            body: None,
        };
        let (result, calls) = run_script(&executor, vec![failure]).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(gaps(&calls), vec![Duration::from_millis(5000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_swap_keeps_cancellation() {
        let token = CancellationToken::new();
        let executor = RetryExecutor::new(RetryPolicy::default())
            .with_cancellation(token.clone())
            .with_policy(RetryPolicy {
                max_retries: 5,
                ..RetryPolicy::default()
            });
        assert_eq!(executor.policy().max_retries, 5);

        token.cancel();
        let start = Instant::now();
        let (result, calls) = run_script(&executor, vec![server_error(); 6]).await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Server);
        assert_eq!(calls.len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retry_after_waits_one_second() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let failure = TransportFailure::Status {
            status: 429,
            retry_after: Some("0".into()),
            body: None,
        };
        let (result, calls) = run_script(&executor, vec![failure]).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(gaps(&calls), vec![Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay_returns_last_error() {
        let token = CancellationToken::new();
        let executor = RetryExecutor::new(RetryPolicy::default()).with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            token.cancel();
        });
        let start = Instant::now();
        let (result, calls) = run_script(&executor, vec![server_error(); 4]).await;
        canceller.await.unwrap();

        assert_eq!(result.unwrap_err().kind, ErrorKind::Server);
        assert_eq!(calls.len(), 1);
        assert!(start.elapsed() < Duration::from_millis(1000));
    }
}
