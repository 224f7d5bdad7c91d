//! Lock-free call metrics.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::clock::{SharedClock, SystemClock};
use crate::metrics::{FailureCounts, MetricsSnapshot};
use crate::retry::FailureKind;

/// Marks an unset timestamp slot.
const NO_TIMESTAMP: i64 = i64::MIN;

/// Counters and timers for one stream of calls.
///
/// Every recording method is a handful of atomic operations, so collectors
/// can be shared freely between tasks. Minimum and maximum latencies are
/// maintained with compare-and-swap loops. A [`snapshot`](Self::snapshot)
/// reads each counter independently; under concurrent recording it is
/// approximately consistent.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use shopify_pipeline::metrics::MetricsCollector;
/// use shopify_pipeline::retry::FailureKind;
///
/// let collector = MetricsCollector::new("rest");
///
/// collector.record_attempt();
/// collector.record_success(Duration::from_millis(120));
/// collector.record_attempt();
/// collector.record_failure(Duration::from_millis(80), FailureKind::ServerError);
///
/// let snapshot = collector.snapshot();
/// assert_eq!(snapshot.total_requests, 2);
/// assert!((snapshot.success_rate - 50.0).abs() < f64::EPSILON);
/// ```
#[derive(Debug)]
pub struct MetricsCollector {
    name: String,
    clock: SharedClock,
    enabled: Arc<AtomicBool>,
    started_at_nanos: AtomicU64,
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    rate_limit_waits: AtomicU64,
    rate_limit_wait_nanos: AtomicU64,
    rate_limit_wait_max_nanos: AtomicU64,
    admission_refusals: AtomicU64,
    latency_total_nanos: AtomicU64,
    latency_min_nanos: AtomicU64,
    latency_max_nanos: AtomicU64,
    failure_kinds: [AtomicU64; FailureKind::ALL.len()],
    last_success_millis: AtomicI64,
    last_failure_millis: AtomicI64,
}

impl MetricsCollector {
    /// Creates a collector driven by real time.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_clock(name, SystemClock::shared())
    }

    /// Creates a collector driven by `clock`.
    #[must_use]
    pub fn with_clock(name: impl Into<String>, clock: SharedClock) -> Self {
        Self::with_switch(name, clock, Arc::new(AtomicBool::new(true)))
    }

    /// Creates a collector that records only while `enabled` is set.
    pub(crate) fn with_switch(
        name: impl Into<String>,
        clock: SharedClock,
        enabled: Arc<AtomicBool>,
    ) -> Self {
        let started_at_nanos = AtomicU64::new(duration_nanos(clock.elapsed()));
        Self {
            name: name.into(),
            clock,
            enabled,
            started_at_nanos,
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            rate_limit_waits: AtomicU64::new(0),
            rate_limit_wait_nanos: AtomicU64::new(0),
            rate_limit_wait_max_nanos: AtomicU64::new(0),
            admission_refusals: AtomicU64::new(0),
            latency_total_nanos: AtomicU64::new(0),
            latency_min_nanos: AtomicU64::new(u64::MAX),
            latency_max_nanos: AtomicU64::new(0),
            failure_kinds: Default::default(),
            last_success_millis: AtomicI64::new(NO_TIMESTAMP),
            last_failure_millis: AtomicI64::new(NO_TIMESTAMP),
        }
    }

    /// Returns the collector name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether recording calls currently have any effect.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Records that an admitted attempt is starting.
    pub fn record_attempt(&self) {
        if self.is_enabled() {
            self.attempts.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a successful call and its latency.
    pub fn record_success(&self, latency: Duration) {
        if !self.is_enabled() {
            return;
        }
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
        self.last_success_millis
            .store(self.clock.now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Records a failed call, its latency and how it failed.
    pub fn record_failure(&self, latency: Duration, kind: FailureKind) {
        if !self.is_enabled() {
            return;
        }
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.failure_kinds[kind.index()].fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
        self.last_failure_millis
            .store(self.clock.now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Records that a retry was scheduled.
    pub fn record_retry(&self) {
        if self.is_enabled() {
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records time spent waiting for rate limiter admission.
    pub fn record_rate_limit_wait(&self, waited: Duration) {
        if !self.is_enabled() {
            return;
        }
        let nanos = duration_nanos(waited);
        self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
        self.rate_limit_wait_nanos.fetch_add(nanos, Ordering::Relaxed);
        raise_to(&self.rate_limit_wait_max_nanos, nanos);
    }

    /// Records an admission the rate limiter refused after `waited`.
    ///
    /// No request was sent, so attempts, completed requests and latency are
    /// left alone.
    pub fn record_admission_refused(&self, waited: Duration) {
        if !self.is_enabled() {
            return;
        }
        self.admission_refusals.fetch_add(1, Ordering::Relaxed);
        self.record_rate_limit_wait(waited);
    }

    /// Zeroes every counter and restarts the uptime clock.
    ///
    /// The collector keeps its name and stays registered wherever it was.
    pub fn reset(&self) {
        for counter in [
            &self.attempts,
            &self.successes,
            &self.failures,
            &self.retries,
            &self.rate_limit_waits,
            &self.rate_limit_wait_nanos,
            &self.rate_limit_wait_max_nanos,
            &self.admission_refusals,
            &self.latency_total_nanos,
            &self.latency_max_nanos,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        for counter in &self.failure_kinds {
            counter.store(0, Ordering::Relaxed);
        }
        self.latency_min_nanos.store(u64::MAX, Ordering::Relaxed);
        self.last_success_millis.store(NO_TIMESTAMP, Ordering::Relaxed);
        self.last_failure_millis.store(NO_TIMESTAMP, Ordering::Relaxed);
        self.started_at_nanos
            .store(duration_nanos(self.clock.elapsed()), Ordering::Relaxed);
    }

    /// Returns a point-in-time view of the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let retries = self.retries.load(Ordering::Relaxed);
        let waits = self.rate_limit_waits.load(Ordering::Relaxed);
        let wait_nanos = self.rate_limit_wait_nanos.load(Ordering::Relaxed);
        let wait_max = self.rate_limit_wait_max_nanos.load(Ordering::Relaxed);
        let refusals = self.admission_refusals.load(Ordering::Relaxed);
        let latency_total = self.latency_total_nanos.load(Ordering::Relaxed);
        let latency_min = self.latency_min_nanos.load(Ordering::Relaxed);
        let latency_max = self.latency_max_nanos.load(Ordering::Relaxed);
        let kind = |kind: FailureKind| self.failure_kinds[kind.index()].load(Ordering::Relaxed);

        let total_requests = successes + failures;
        let started = Duration::from_nanos(self.started_at_nanos.load(Ordering::Relaxed));
        let uptime = self.clock.elapsed().saturating_sub(started);

        MetricsSnapshot {
            name: self.name.clone(),
            taken_at: self.clock.now(),
            total_attempts: attempts,
            total_requests,
            successful_requests: successes,
            failed_requests: failures,
            success_rate: percentage(successes, total_requests),
            failure_rate: percentage(failures, total_requests),
            total_retries: retries,
            retry_rate: percentage(retries, total_requests),
            rate_limit_waits: waits,
            total_rate_limit_wait: Duration::from_nanos(wait_nanos),
            average_rate_limit_wait: average(wait_nanos, waits),
            max_rate_limit_wait: Duration::from_nanos(wait_max),
            admission_refusals: refusals,
            min_latency: if total_requests == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(latency_min)
            },
            average_latency: average(latency_total, total_requests),
            max_latency: Duration::from_nanos(latency_max),
            uptime,
            attempts_per_second: per_second(attempts, uptime),
            last_success: timestamp(self.last_success_millis.load(Ordering::Relaxed)),
            last_failure: timestamp(self.last_failure_millis.load(Ordering::Relaxed)),
            failures_by_kind: FailureCounts {
                rate_limited: kind(FailureKind::RateLimited),
                server_error: kind(FailureKind::ServerError),
                client_error: kind(FailureKind::ClientError),
                authentication: kind(FailureKind::Authentication),
                network: kind(FailureKind::Network),
                timeout: kind(FailureKind::Timeout),
            },
        }
    }

    fn record_latency(&self, latency: Duration) {
        let nanos = duration_nanos(latency);
        self.latency_total_nanos.fetch_add(nanos, Ordering::Relaxed);

        let mut current = self.latency_min_nanos.load(Ordering::Relaxed);
        while nanos < current {
            match self.latency_min_nanos.compare_exchange_weak(
                current,
                nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        raise_to(&self.latency_max_nanos, nanos);
    }
}

fn raise_to(slot: &AtomicU64, nanos: u64) {
    let mut current = slot.load(Ordering::Relaxed);
    while nanos > current {
        match slot.compare_exchange_weak(current, nanos, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn average(total_nanos: u64, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(total_nanos / count)
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn per_second(count: u64, over: Duration) -> f64 {
    let secs = over.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        count as f64 / secs
    }
}

fn timestamp(millis: i64) -> Option<DateTime<Utc>> {
    if millis == NO_TIMESTAMP {
        None
    } else {
        Utc.timestamp_millis_opt(millis).single()
    }
}

// Verify MetricsCollector is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<MetricsCollector>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manual() -> (Arc<ManualClock>, MetricsCollector) {
        let clock = Arc::new(ManualClock::new());
        let collector = MetricsCollector::with_clock("test", clock.clone());
        (clock, collector)
    }

    #[test]
    fn test_empty_snapshot() {
        let (_, collector) = manual();
        let snapshot = collector.snapshot();

        assert_eq!(snapshot.name, "test");
        assert_eq!(snapshot.total_requests, 0);
        assert!(snapshot.success_rate.abs() < f64::EPSILON);
        assert_eq!(snapshot.min_latency, Duration::ZERO);
        assert_eq!(snapshot.average_latency, Duration::ZERO);
        assert!(snapshot.last_success.is_none());
        assert!(snapshot.last_failure.is_none());
    }

    #[test]
    fn test_latency_min_avg_max() {
        let (_, collector) = manual();
        collector.record_success(Duration::from_millis(100));
        collector.record_success(Duration::from_millis(300));
        collector.record_failure(Duration::from_millis(200), FailureKind::Timeout);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.min_latency, Duration::from_millis(100));
        assert_eq!(snapshot.average_latency, Duration::from_millis(200));
        assert_eq!(snapshot.max_latency, Duration::from_millis(300));
        assert_eq!(snapshot.failures_by_kind.timeout, 1);
    }

    #[test]
    fn test_rate_limit_wait_aggregates() {
        let (_, collector) = manual();
        collector.record_rate_limit_wait(Duration::from_millis(100));
        collector.record_rate_limit_wait(Duration::from_millis(300));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.rate_limit_waits, 2);
        assert_eq!(snapshot.total_rate_limit_wait, Duration::from_millis(400));
        assert_eq!(snapshot.average_rate_limit_wait, Duration::from_millis(200));
        assert_eq!(snapshot.max_rate_limit_wait, Duration::from_millis(300));
    }

    #[test]
    fn test_admission_refusal_leaves_request_counters_alone() {
        let (_, collector) = manual();
        collector.record_attempt();
        collector.record_failure(Duration::from_millis(50), FailureKind::ServerError);
        collector.record_admission_refused(Duration::from_millis(100));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_attempts, 1);
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.min_latency, Duration::from_millis(50));
        assert_eq!(snapshot.admission_refusals, 1);
        assert_eq!(snapshot.rate_limit_waits, 1);
        assert_eq!(snapshot.failures_by_kind.rate_limited, 0);
        assert!(snapshot.has_rate_limiting());
    }

    #[test]
    fn test_uptime_and_attempt_rate_follow_clock() {
        let (clock, collector) = manual();
        for _ in 0..10 {
            collector.record_attempt();
        }
        clock.advance(Duration::from_secs(5));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.uptime, Duration::from_secs(5));
        assert!((snapshot.attempts_per_second - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_last_timestamps_use_clock() {
        let (clock, collector) = manual();
        collector.record_success(Duration::from_millis(1));
        clock.advance(Duration::from_secs(2));
        collector.record_failure(Duration::from_millis(1), FailureKind::Network);

        let snapshot = collector.snapshot();
        let success = snapshot.last_success.unwrap();
        let failure = snapshot.last_failure.unwrap();
        assert_eq!((failure - success).num_seconds(), 2);
    }

    #[test]
    fn test_reset_keeps_name_and_clears_counters() {
        let (clock, collector) = manual();
        collector.record_attempt();
        collector.record_success(Duration::from_millis(10));
        collector.record_retry();
        collector.record_admission_refused(Duration::from_millis(400));
        clock.advance(Duration::from_secs(10));

        collector.reset();

        let snapshot = collector.snapshot();
        assert_eq!(collector.name(), "test");
        assert_eq!(snapshot.total_attempts, 0);
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.total_retries, 0);
        assert_eq!(snapshot.max_latency, Duration::ZERO);
        assert_eq!(snapshot.max_rate_limit_wait, Duration::ZERO);
        assert_eq!(snapshot.admission_refusals, 0);
        assert_eq!(snapshot.uptime, Duration::ZERO);
        assert!(snapshot.last_success.is_none());
    }

    #[test]
    fn test_disabled_switch_skips_recording() {
        let switch = Arc::new(AtomicBool::new(false));
        let collector =
            MetricsCollector::with_switch("off", Arc::new(ManualClock::new()), switch.clone());

        collector.record_attempt();
        collector.record_success(Duration::from_millis(5));
        assert_eq!(collector.snapshot().total_attempts, 0);

        switch.store(true, Ordering::Relaxed);
        collector.record_attempt();
        assert_eq!(collector.snapshot().total_attempts, 1);
    }
}
