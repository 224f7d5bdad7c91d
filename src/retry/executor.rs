//! The retrying executor.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::metrics::MetricsCollector;
use crate::ratelimit::{RateLimitError, RateLimiter};
use crate::retry::{AttemptFailure, FailureKind, MaxRetriesExceededError, RetryError, RetryPolicy};

/// Information handed to each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptContext {
    /// The attempt number, starting at 1.
    pub attempt: u32,
    /// Attempts allowed for this call.
    pub max_attempts: u32,
}

impl AttemptContext {
    /// Whether this is the last attempt the policy allows.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Runs attempts under a [`RetryPolicy`], gated by a [`RateLimiter`].
///
/// Before each attempt the executor waits up to the policy's
/// `rate_limit_wait` for a token. Every attempt outcome, scheduled retry and
/// non-zero admission wait is reported to each attached
/// [`MetricsCollector`].
///
/// The executor never builds requests itself: the caller supplies a closure
/// that performs one attempt and classifies its failure.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use shopify_pipeline::retry::{AttemptFailure, RetryingExecutor};
///
/// let executor = RetryingExecutor::new(limiters.rest(), metrics.for_api(ApiKind::Rest))
///     .also_report_to(metrics.global());
///
/// let body = executor
///     .execute(config.retry_policy(), "products.list", |ctx| async move {
///         let response = transport.get("products.json").await
///             .map_err(|e| AttemptFailure::network(e.to_string()))?;
///         if response.status >= 400 {
///             return Err(AttemptFailure::from_status(response.status, response.body));
///         }
///         Ok(response.body)
///     })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct RetryingExecutor {
    limiter: Arc<RateLimiter>,
    collectors: Vec<Arc<MetricsCollector>>,
}

impl RetryingExecutor {
    /// Creates an executor admitting through `limiter` and reporting to
    /// `collector`.
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>, collector: Arc<MetricsCollector>) -> Self {
        Self {
            limiter,
            collectors: vec![collector],
        }
    }

    /// Adds another collector that receives every report.
    #[must_use]
    pub fn also_report_to(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.collectors.push(collector);
        self
    }

    /// Returns the limiter consulted before each attempt.
    #[must_use]
    pub const fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Runs `attempt` until it succeeds, fails terminally or the policy is
    /// exhausted.
    ///
    /// `operation` names the call in logs.
    ///
    /// # Errors
    ///
    /// - [`RetryError::Failed`] for a non-retryable failure, or any failure
    ///   when the policy allows a single attempt
    /// - [`RetryError::MaxRetriesExceeded`] when every attempt failed retryably
    /// - [`RetryError::RateLimitTimeout`] when admission is refused twice, or
    ///   refused for the last attempt the policy allows
    /// - [`RetryError::OperationTimeout`] when the policy's operation timeout elapses
    pub async fn execute<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        operation: &str,
        attempt: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, AttemptFailure>>,
    {
        let never = CancellationToken::new();
        self.execute_with_cancellation(&never, policy, operation, attempt)
            .await
    }

    /// Like [`execute`](Self::execute), but stops as soon as `cancel` fires.
    ///
    /// The in-flight attempt, admission wait or backoff sleep is dropped.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus [`RetryError::Cancelled`].
    pub async fn execute_with_cancellation<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        policy: &RetryPolicy,
        operation: &str,
        attempt: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, AttemptFailure>>,
    {
        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let run = tokio::time::timeout(
            policy.operation_timeout(),
            self.run(policy, operation, &attempts, attempt),
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let attempts = attempts.load(Ordering::Relaxed);
                tracing::info!(operation, attempts, "Call cancelled");
                Err(RetryError::Cancelled { attempts })
            }
            result = run => result.unwrap_or_else(|_| {
                let elapsed = started.elapsed();
                let attempts = attempts.load(Ordering::Relaxed);
                tracing::warn!(
                    operation,
                    attempts,
                    elapsed_ms = elapsed.as_millis(),
                    "Call exceeded its operation timeout"
                );
                Err(RetryError::OperationTimeout { elapsed, attempts })
            }),
        }
    }

    async fn run<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        operation: &str,
        attempts: &AtomicU32,
        mut attempt: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, AttemptFailure>>,
    {
        let max_attempts = policy.effective_max_attempts();
        let mut admission_refused = false;

        loop {
            let number = attempts.fetch_add(1, Ordering::Relaxed) + 1;

            let failure = match self.limiter.acquire_timeout(policy.rate_limit_wait()).await {
                Ok(waited) => {
                    if !waited.is_zero() {
                        self.report(|c| c.record_rate_limit_wait(waited));
                    }
                    self.report(MetricsCollector::record_attempt);
                    let context = AttemptContext {
                        attempt: number,
                        max_attempts,
                    };
                    let attempt_started = Instant::now();
                    match attempt(context).await {
                        Ok(value) => {
                            let latency = attempt_started.elapsed();
                            self.report(|c| c.record_success(latency));
                            if number > 1 {
                                tracing::debug!(operation, attempt = number, "Call succeeded after retry");
                            }
                            return Ok(value);
                        }
                        Err(failure) => {
                            let latency = attempt_started.elapsed();
                            self.report(|c| c.record_failure(latency, failure.kind));
                            failure
                        }
                    }
                }
                Err(err) => {
                    let waited = match &err {
                        RateLimitError::Timeout { waited, .. } => *waited,
                        _ => Duration::ZERO,
                    };
                    self.report(|c| c.record_admission_refused(waited));
                    if admission_refused || number >= max_attempts {
                        tracing::warn!(
                            operation,
                            attempt = number,
                            limiter = %self.limiter.name(),
                            "Rate limiter refused admission"
                        );
                        return Err(RetryError::RateLimitTimeout(err));
                    }
                    admission_refused = true;
                    AttemptFailure::new(FailureKind::RateLimited, err.to_string())
                }
            };

            if !failure.is_retryable() || max_attempts == 1 {
                tracing::debug!(operation, attempt = number, failure = %failure, "Call failed");
                return Err(RetryError::Failed(failure));
            }

            if number >= max_attempts {
                tracing::warn!(
                    operation,
                    attempts = number,
                    failure = %failure,
                    "Call failed after exhausting retries"
                );
                return Err(MaxRetriesExceededError {
                    attempts: number,
                    last_failure: failure,
                }
                .into());
            }

            let delay = policy.delay_for(number, failure.retry_after, &mut rand::thread_rng());
            self.report(MetricsCollector::record_retry);
            tracing::warn!(
                operation,
                attempt = number,
                max_attempts,
                delay_ms = delay.as_millis(),
                failure = %failure,
                "Retrying call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn report(&self, record: impl Fn(&MetricsCollector)) {
        for collector in &self.collectors {
            record(collector.as_ref());
        }
    }
}

// Verify RetryingExecutor is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RetryingExecutor>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn executor(capacity: u32) -> (RetryingExecutor, Arc<MetricsCollector>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::with_clock("test", capacity, 1, clock.clone()).unwrap());
        let collector = Arc::new(MetricsCollector::with_clock("test", clock));
        (RetryingExecutor::new(limiter, collector.clone()), collector)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::builder()
            .base_delay(Duration::from_millis(10))
            .jitter(0.0)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let (executor, collector) = executor(10);
        let result = executor
            .execute(&fast_policy(), "test", |ctx| async move { Ok::<_, AttemptFailure>(ctx.attempt) })
            .await;

        assert_eq!(result.unwrap(), 1);
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_attempts, 1);
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.total_retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failure() {
        let (executor, collector) = executor(10);
        let result = executor
            .execute(&fast_policy(), "test", |ctx| async move {
                if ctx.attempt < 2 {
                    Err(AttemptFailure::network("connection reset"))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_attempts, 2);
        assert_eq!(snapshot.failures_by_kind.network, 1);
        assert_eq!(snapshot.total_retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_is_not_retried() {
        let (executor, collector) = executor(10);
        let result: Result<(), _> = executor
            .execute(&fast_policy(), "test", |_| async {
                Err(AttemptFailure::from_status(401, "Unauthorized"))
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Failed(ref f)) if f.kind == FailureKind::Authentication
        ));
        assert_eq!(collector.snapshot().total_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_policy_makes_one_attempt() {
        let (executor, collector) = executor(10);
        let result: Result<(), _> = executor
            .execute(&RetryPolicy::disabled(), "test", |_| async {
                Err(AttemptFailure::from_status(503, "unavailable"))
            })
            .await;

        assert!(matches!(result, Err(RetryError::Failed(_))));
        assert_eq!(collector.snapshot().total_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_reports_last_attempt() {
        let (executor, _) = executor(10);
        let mut seen = Vec::new();
        let _: Result<(), _> = executor
            .execute(&fast_policy(), "test", |ctx| {
                seen.push((ctx.attempt, ctx.is_last()));
                async { Err(AttemptFailure::timeout("slow")) }
            })
            .await;

        assert_eq!(seen, vec![(1, false), (2, false), (3, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_policy_surfaces_admission_refusal() {
        let (executor, collector) = executor(1);
        assert!(executor.limiter().try_acquire_now(1));

        let result: Result<(), _> = executor
            .execute(&RetryPolicy::disabled(), "test", |_| async { Ok(()) })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::RateLimitTimeout(RateLimitError::Timeout { .. }))
        ));
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_attempts, 0);
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.admission_refusals, 1);
    }
}
