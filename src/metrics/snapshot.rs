//! Serializable metrics views.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::retry::FailureKind;

/// Failure rate, in percent, above which a snapshot is flagged.
const HIGH_FAILURE_RATE: f64 = 10.0;

/// Average latency above which a snapshot is flagged as slow.
const SLOW_RESPONSE_THRESHOLD: Duration = Duration::from_secs(2);

/// Failures broken down by [`FailureKind`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    /// HTTP 429 responses.
    pub rate_limited: u64,
    /// HTTP 5xx.
    pub server_error: u64,
    /// Other HTTP 4xx.
    pub client_error: u64,
    /// HTTP 401 and 403.
    pub authentication: u64,
    /// Transport failures.
    pub network: u64,
    /// Timed-out attempts.
    pub timeout: u64,
}

impl FailureCounts {
    /// Returns the count for `kind`.
    #[must_use]
    pub const fn get(&self, kind: FailureKind) -> u64 {
        match kind {
            FailureKind::RateLimited => self.rate_limited,
            FailureKind::ServerError => self.server_error,
            FailureKind::ClientError => self.client_error,
            FailureKind::Authentication => self.authentication,
            FailureKind::Network => self.network,
            FailureKind::Timeout => self.timeout,
        }
    }

    /// Sum over every kind.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.rate_limited
            + self.server_error
            + self.client_error
            + self.authentication
            + self.network
            + self.timeout
    }
}

/// Point-in-time view of one [`MetricsCollector`](crate::metrics::MetricsCollector).
///
/// Rates are percentages in `0.0..=100.0` and are zero when no request has
/// completed. `retry_rate` is retries per completed request and may exceed
/// 100 when calls are retried repeatedly.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Collector name.
    pub name: String,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Attempts started, including retries.
    pub total_attempts: u64,
    /// Attempts that completed, successfully or not.
    pub total_requests: u64,
    /// Completed attempts that succeeded.
    pub successful_requests: u64,
    /// Completed attempts that failed.
    pub failed_requests: u64,
    /// `successful_requests / total_requests`, in percent.
    pub success_rate: f64,
    /// `failed_requests / total_requests`, in percent.
    pub failure_rate: f64,
    /// Retries scheduled.
    pub total_retries: u64,
    /// `total_retries / total_requests`, in percent.
    pub retry_rate: f64,
    /// Admissions that had to wait for a token.
    pub rate_limit_waits: u64,
    /// Total time spent waiting for tokens.
    pub total_rate_limit_wait: Duration,
    /// Mean wait per waiting admission.
    pub average_rate_limit_wait: Duration,
    /// Longest single wait for a token.
    pub max_rate_limit_wait: Duration,
    /// Admissions the rate limiter refused. These never reach the request counters.
    pub admission_refusals: u64,
    /// Fastest completed attempt.
    pub min_latency: Duration,
    /// Mean latency of completed attempts.
    pub average_latency: Duration,
    /// Slowest completed attempt.
    pub max_latency: Duration,
    /// Time since the collector was created or last reset.
    pub uptime: Duration,
    /// Attempts per second of uptime.
    pub attempts_per_second: f64,
    /// When the last success was recorded.
    pub last_success: Option<DateTime<Utc>>,
    /// When the last failure was recorded.
    pub last_failure: Option<DateTime<Utc>>,
    /// Failures by kind.
    pub failures_by_kind: FailureCounts,
}

impl MetricsSnapshot {
    /// Whether any failure was recorded.
    #[must_use]
    pub const fn has_errors(&self) -> bool {
        self.failed_requests > 0
    }

    /// Whether more than 10% of completed requests failed.
    #[must_use]
    pub fn has_high_failure_rate(&self) -> bool {
        self.failure_rate > HIGH_FAILURE_RATE
    }

    /// Whether the average latency exceeds two seconds.
    #[must_use]
    pub fn has_slow_responses(&self) -> bool {
        self.average_latency > SLOW_RESPONSE_THRESHOLD
    }

    /// Whether any admission waited or was refused, or any call was rejected with 429.
    #[must_use]
    pub const fn has_rate_limiting(&self) -> bool {
        self.rate_limit_waits > 0
            || self.admission_refusals > 0
            || self.failures_by_kind.rate_limited > 0
    }
}

/// Combined view of every collector in a [`MetricsRegistry`](crate::metrics::MetricsRegistry).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonitoringReport {
    /// When the report was generated.
    pub timestamp: DateTime<Utc>,
    /// Whether recording was enabled at the time.
    pub enabled: bool,
    /// Every call, whichever API it targeted.
    pub global: MetricsSnapshot,
    /// REST calls.
    pub rest: MetricsSnapshot,
    /// GraphQL calls.
    pub graphql: MetricsSnapshot,
    /// Custom collectors, by name.
    pub custom: BTreeMap<String, MetricsSnapshot>,
}

impl MonitoringReport {
    /// Whether the global collector shows a failure rate above 10%.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.global.has_high_failure_rate()
    }
}
