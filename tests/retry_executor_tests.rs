//! Integration tests for the retrying executor.
//!
//! All tests run on tokio's paused clock, so backoff sleeps and admission
//! waits complete instantly while elapsed time stays observable.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shopify_pipeline::clock::{ManualClock, SystemClock};
use shopify_pipeline::metrics::MetricsCollector;
use shopify_pipeline::ratelimit::{RateLimitError, RateLimiter};
use shopify_pipeline::retry::{AttemptFailure, FailureKind, RetryError, RetryingExecutor};
use shopify_pipeline::RetryPolicy;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Creates an executor whose limiter never refills on its own.
fn executor_with_capacity(capacity: u32) -> (RetryingExecutor, Arc<MetricsCollector>) {
    let clock = Arc::new(ManualClock::new());
    let limiter = RateLimiter::with_clock("rest", capacity, 1, clock.clone()).unwrap();
    let collector = Arc::new(MetricsCollector::with_clock("rest", clock));
    (
        RetryingExecutor::new(Arc::new(limiter), Arc::clone(&collector)),
        collector,
    )
}

/// A policy with one-second base delay and no jitter.
fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .base_delay(Duration::from_secs(1))
        .jitter(0.0)
        .build()
        .unwrap()
}

// ============================================================================
// Retry Decisions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_server_errors_exhaust_attempts() {
    let (executor, collector) = executor_with_capacity(40);
    let calls = AtomicU32::new(0);

    let err = executor
        .execute(&policy(3), "products.list", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AttemptFailure::from_status(503, "Service Unavailable")) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match err {
        RetryError::MaxRetriesExceeded(err) => {
            assert_eq!(err.attempts, 3);
            assert_eq!(err.last_failure.status, Some(503));
        }
        other => panic!("Expected MaxRetriesExceeded, got: {other:?}"),
    }

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.total_attempts, 3);
    assert_eq!(snapshot.failed_requests, 3);
    assert_eq!(snapshot.total_retries, 2);
    assert_eq!(snapshot.failures_by_kind.server_error, 3);
}

#[tokio::test(start_paused = true)]
async fn test_client_error_fails_after_one_attempt() {
    let (executor, collector) = executor_with_capacity(40);
    let calls = AtomicU32::new(0);

    let err = executor
        .execute(&policy(3), "products.create", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AttemptFailure::from_status(422, "Unprocessable Entity")) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, RetryError::Failed(ref failure) if failure.kind == FailureKind::ClientError));
    assert_eq!(err.last_failure().and_then(|f| f.status), Some(422));
    assert_eq!(collector.snapshot().total_retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_between_attempts() {
    let (executor, _) = executor_with_capacity(40);
    let started = Instant::now();

    let _ = executor
        .execute(&policy(3), "orders.list", |_| async {
            Err::<(), _>(AttemptFailure::network("connection reset"))
        })
        .await;

    // 1s before the second attempt, 2s before the third
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_replaces_backoff() {
    let (executor, _) = executor_with_capacity(40);
    let started = Instant::now();

    let result = executor
        .execute(&policy(3), "orders.list", |ctx| async move {
            if ctx.attempt == 1 {
                Err(AttemptFailure::from_status(429, "Throttled")
                    .with_retry_after(Duration::from_secs(5)))
            } else {
                Ok(ctx.attempt)
            }
        })
        .await;

    assert_eq!(result.unwrap(), 2);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "elapsed {elapsed:?}");
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_second_admission_refusal_stops_the_call() {
    let (executor, collector) = executor_with_capacity(1);
    assert!(executor.limiter().try_acquire_now(1));
    let calls = AtomicU32::new(0);

    let policy = RetryPolicy::builder()
        .rate_limit_wait(Duration::from_millis(100))
        .base_delay(Duration::from_millis(10))
        .jitter(0.0)
        .build()
        .unwrap();

    let err = executor
        .execute(&policy, "products.list", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, AttemptFailure>(()) }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RetryError::RateLimitTimeout(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Refusals are waits, not requests
    let snapshot = collector.snapshot();
    assert_eq!(snapshot.total_attempts, 0);
    assert_eq!(snapshot.total_requests, 0);
    assert_eq!(snapshot.admission_refusals, 2);
    assert_eq!(snapshot.rate_limit_waits, 2);
    assert_eq!(snapshot.failures_by_kind.rate_limited, 0);
    assert!(snapshot.total_rate_limit_wait >= Duration::from_millis(200));
    assert!(snapshot.max_rate_limit_wait >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_refusal_on_final_attempt_is_a_rate_limit_timeout() {
    let (executor, collector) = executor_with_capacity(1);
    let calls = AtomicU32::new(0);

    let policy = RetryPolicy::builder()
        .max_attempts(2)
        .rate_limit_wait(Duration::from_millis(100))
        .base_delay(Duration::from_millis(10))
        .jitter(0.0)
        .build()
        .unwrap();

    let err = executor
        .execute(&policy, "products.list", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AttemptFailure::from_status(503, "Service Unavailable")) }
        })
        .await
        .unwrap_err();

    match err {
        RetryError::RateLimitTimeout(RateLimitError::Timeout { limiter, .. }) => {
            assert_eq!(limiter, "rest");
        }
        other => panic!("Expected RateLimitTimeout, got: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.total_attempts, 1);
    assert_eq!(snapshot.total_requests, 1);
    assert_eq!(snapshot.failures_by_kind.server_error, 1);
    assert_eq!(snapshot.admission_refusals, 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_policy_refusal_keeps_the_limiter_error() {
    let (executor, _) = executor_with_capacity(1);
    assert!(executor.limiter().try_acquire_now(1));

    let policy = RetryPolicy::builder()
        .enabled(false)
        .rate_limit_wait(Duration::from_millis(100))
        .build()
        .unwrap();

    let err = executor
        .execute(&policy, "shop.get", |_| async { Ok::<_, AttemptFailure>(()) })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RetryError::RateLimitTimeout(RateLimitError::Timeout { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_single_refusal_is_retried() {
    let limiter = Arc::new(RateLimiter::with_clock("rest", 1, 1, SystemClock::shared()).unwrap());
    let collector = Arc::new(MetricsCollector::new("rest"));
    let executor = RetryingExecutor::new(Arc::clone(&limiter), Arc::clone(&collector));
    assert!(limiter.try_acquire_now(1));

    let policy = RetryPolicy::builder()
        .rate_limit_wait(Duration::from_millis(100))
        .jitter(0.0)
        .build()
        .unwrap();

    let result = executor
        .execute(&policy, "shop.get", |ctx| async move { Ok::<_, AttemptFailure>(ctx.attempt) })
        .await;

    assert_eq!(result.unwrap(), 2);
    let snapshot = collector.snapshot();
    assert_eq!(snapshot.total_attempts, 1);
    assert_eq!(snapshot.successful_requests, 1);
    assert_eq!(snapshot.admission_refusals, 1);
    assert_eq!(snapshot.total_retries, 1);
}

// ============================================================================
// Timeout and Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_operation_timeout_bounds_the_call() {
    let (executor, _) = executor_with_capacity(40);
    let policy = RetryPolicy::builder()
        .operation_timeout(Duration::from_secs(1))
        .base_delay(Duration::from_millis(100))
        .build()
        .unwrap();

    let err = executor
        .execute(&policy, "bulk.export", |_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, AttemptFailure>(())
        })
        .await
        .unwrap_err();

    match err {
        RetryError::OperationTimeout { elapsed, attempts } => {
            assert_eq!(attempts, 1);
            assert!(elapsed >= Duration::from_secs(1));
        }
        other => panic!("Expected OperationTimeout, got: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_in_flight_attempt() {
    let (executor, collector) = executor_with_capacity(40);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let err = executor
        .execute_with_cancellation(&cancel, &policy(3), "bulk.export", |_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, AttemptFailure>(())
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err, RetryError::Cancelled { attempts: 1 });
    assert_eq!(collector.snapshot().successful_requests, 0);
}

// ============================================================================
// Metrics Fan-out
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_every_collector_receives_reports() {
    let (executor, api) = executor_with_capacity(40);
    let global = Arc::new(MetricsCollector::new("global"));
    let executor = executor.also_report_to(Arc::clone(&global));

    let result = executor
        .execute(&policy(3), "shop.get", |ctx| async move {
            if ctx.is_last() {
                Ok("shop")
            } else {
                Err(AttemptFailure::timeout("read timed out"))
            }
        })
        .await;

    assert_eq!(result.unwrap(), "shop");
    for snapshot in [api.snapshot(), global.snapshot()] {
        assert_eq!(snapshot.total_attempts, 3);
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.failures_by_kind.timeout, 2);
        assert_eq!(snapshot.total_retries, 2);
    }
}
