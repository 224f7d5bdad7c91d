//! Token bucket rate limiter.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::clock::{SharedClock, SystemClock};
use crate::config::validate_bucket;
use crate::error::ConfigError;
use crate::ratelimit::RateLimitError;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Shortest sleep between admission checks.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A token bucket admission gate.
///
/// The bucket starts full. Tokens are restored lazily: every access first
/// adds `floor(elapsed_seconds * refill_rate)` tokens, clamped to capacity.
/// The refill timestamp advances only by the time those whole tokens took to
/// accrue, so fractional progress toward the next token is never lost. Once
/// the bucket is full, the timestamp snaps to the current instant.
///
/// Refill and debit happen inside one short critical section, so concurrent
/// callers can never drive the token count below zero or above capacity.
/// The lock is never held across an await point.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use shopify_pipeline::clock::ManualClock;
/// use shopify_pipeline::ratelimit::RateLimiter;
///
/// let clock = Arc::new(ManualClock::new());
/// let limiter = RateLimiter::with_clock("rest", 40, 2, clock.clone()).unwrap();
///
/// assert!(limiter.try_acquire_now(40));
/// assert_eq!(limiter.available_tokens(), 0);
///
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(limiter.available_tokens(), 10);
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    capacity: u32,
    refill_rate: u32,
    clock: SharedClock,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Duration,
}

/// Point-in-time view of a [`RateLimiter`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RateLimiterState {
    /// Limiter name.
    pub name: String,
    /// Tokens currently available.
    pub available_tokens: u32,
    /// Maximum number of tokens.
    pub capacity: u32,
    /// Tokens restored per second.
    pub refill_rate_per_second: u32,
    /// Wall-clock time of the last refill.
    pub last_refill: DateTime<Utc>,
}

impl RateLimiterState {
    /// Share of the bucket currently in use, from 0 to 100.
    #[must_use]
    pub fn utilization_percentage(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        let used = f64::from(self.capacity - self.available_tokens.min(self.capacity));
        used * 100.0 / f64::from(self.capacity)
    }
}

impl RateLimiter {
    /// Creates a full limiter driven by real time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRateLimit`] if `capacity` or
    /// `refill_rate` is zero.
    pub fn new(name: impl Into<String>, capacity: u32, refill_rate: u32) -> Result<Self, ConfigError> {
        Self::with_clock(name, capacity, refill_rate, SystemClock::shared())
    }

    /// Creates a full limiter driven by `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRateLimit`] if `capacity` or
    /// `refill_rate` is zero.
    pub fn with_clock(
        name: impl Into<String>,
        capacity: u32,
        refill_rate: u32,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        validate_bucket(&name, capacity, refill_rate)?;

        let last_refill = clock.elapsed();
        Ok(Self {
            name,
            capacity,
            refill_rate,
            clock,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill,
            }),
        })
    }

    /// Returns the limiter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the bucket capacity.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Returns the number of tokens restored per second.
    #[must_use]
    pub const fn refill_rate(&self) -> u32 {
        self.refill_rate
    }

    /// Waits until one token is available and takes it.
    pub async fn acquire(&self) {
        // A single token never exceeds a validated capacity
        let _ = self.acquire_cost_within(1, None).await;
    }

    /// Waits up to `timeout` for one token.
    ///
    /// Returns how long the caller waited.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Timeout`] when the budget elapses first.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Duration, RateLimitError> {
        self.acquire_cost_within(1, Some(timeout)).await
    }

    /// Waits up to `timeout` for one token, returning `false` on timeout.
    pub async fn try_acquire(&self, timeout: Duration) -> bool {
        self.acquire_timeout(timeout).await.is_ok()
    }

    /// Waits until `cost` tokens are available and takes them.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::CostExceedsCapacity`] immediately if `cost`
    /// is larger than the bucket.
    pub async fn acquire_cost(&self, cost: u32) -> Result<Duration, RateLimitError> {
        self.acquire_cost_within(cost, None).await
    }

    /// Waits up to `timeout` for `cost` tokens, returning `false` on timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::CostExceedsCapacity`] immediately if `cost`
    /// is larger than the bucket.
    pub async fn try_acquire_cost(&self, cost: u32, timeout: Duration) -> Result<bool, RateLimitError> {
        match self.acquire_cost_within(cost, Some(timeout)).await {
            Ok(_) => Ok(true),
            Err(RateLimitError::Timeout { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Takes `cost` tokens if they are available right now.
    #[must_use]
    pub fn try_acquire_now(&self, cost: u32) -> bool {
        self.take_or_wait(cost).is_none()
    }

    /// Waits up to `timeout` (forever if `None`) for `cost` tokens.
    ///
    /// Returns how long the caller waited. The wait budget is measured on
    /// tokio's clock; refill is measured on the limiter's clock.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::CostExceedsCapacity`] if `cost` exceeds the
    /// capacity, or [`RateLimitError::Timeout`] when the budget elapses.
    pub async fn acquire_cost_within(
        &self,
        cost: u32,
        timeout: Option<Duration>,
    ) -> Result<Duration, RateLimitError> {
        if cost > self.capacity {
            return Err(RateLimitError::CostExceedsCapacity {
                limiter: self.name.clone(),
                cost,
                capacity: self.capacity,
            });
        }

        let started = Instant::now();
        loop {
            let Some(until_ready) = self.take_or_wait(cost) else {
                return Ok(started.elapsed());
            };

            let waited = started.elapsed();
            let sleep_for = match timeout {
                Some(budget) if waited >= budget => {
                    tracing::debug!(
                        limiter = %self.name,
                        cost,
                        waited_ms = waited.as_millis(),
                        "Rate limiter wait budget exhausted"
                    );
                    return Err(RateLimitError::Timeout {
                        limiter: self.name.clone(),
                        waited,
                    });
                }
                Some(budget) => until_ready.min(budget - waited),
                None => until_ready,
            };

            tracing::trace!(
                limiter = %self.name,
                cost,
                sleep_ms = sleep_for.as_millis(),
                "Waiting for rate limiter tokens"
            );
            tokio::time::sleep(sleep_for.max(MIN_POLL_INTERVAL)).await;
        }
    }

    /// Returns the number of tokens available now.
    #[must_use]
    pub fn available_tokens(&self) -> u32 {
        let now = self.clock.elapsed();
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, now);
        bucket.tokens
    }

    /// Refills the bucket to capacity.
    pub fn reset(&self) {
        let now = self.clock.elapsed();
        let mut bucket = self.bucket.lock();
        bucket.tokens = self.capacity;
        bucket.last_refill = now;
    }

    /// Aligns the bucket with the budget Shopify reports.
    ///
    /// `remaining` is clamped to the local capacity. Reports with a
    /// `maximum` of zero are ignored.
    pub fn sync_from_remote(&self, remaining: u32, maximum: u32) {
        if maximum == 0 {
            return;
        }
        let now = self.clock.elapsed();
        let mut bucket = self.bucket.lock();
        bucket.tokens = remaining.min(self.capacity);
        bucket.last_refill = now;
        tracing::debug!(
            limiter = %self.name,
            remaining,
            maximum,
            tokens = bucket.tokens,
            "Synchronized rate limiter with remote budget"
        );
    }

    /// Returns a snapshot of the limiter.
    #[must_use]
    pub fn state(&self) -> RateLimiterState {
        let now = self.clock.elapsed();
        let wall_now = self.clock.now();
        let (tokens, last_refill) = {
            let mut bucket = self.bucket.lock();
            self.refill(&mut bucket, now);
            (bucket.tokens, bucket.last_refill)
        };

        let since_refill = chrono::Duration::from_std(now.saturating_sub(last_refill))
            .unwrap_or_else(|_| chrono::Duration::zero());

        RateLimiterState {
            name: self.name.clone(),
            available_tokens: tokens,
            capacity: self.capacity,
            refill_rate_per_second: self.refill_rate,
            last_refill: wall_now - since_refill,
        }
    }

    /// Refills, then either debits `cost` and returns `None` or returns the
    /// time until enough tokens will have accrued.
    fn take_or_wait(&self, cost: u32) -> Option<Duration> {
        let now = self.clock.elapsed();
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, now);

        if bucket.tokens >= cost {
            bucket.tokens -= cost;
            return None;
        }

        let deficit = u128::from(cost - bucket.tokens);
        let rate = u128::from(self.refill_rate);
        let needed_nanos = (deficit * NANOS_PER_SEC + rate - 1) / rate;
        let accrued_nanos = now.saturating_sub(bucket.last_refill).as_nanos();
        let remaining = needed_nanos.saturating_sub(accrued_nanos);
        Some(Duration::from_nanos(u64::try_from(remaining).unwrap_or(u64::MAX)))
    }

    fn refill(&self, bucket: &mut Bucket, now: Duration) {
        let elapsed = now.saturating_sub(bucket.last_refill);
        let rate = u128::from(self.refill_rate);
        let earned = elapsed.as_nanos() * rate / NANOS_PER_SEC;
        if earned == 0 {
            return;
        }

        let room = self.capacity - bucket.tokens;
        match u32::try_from(earned) {
            Ok(earned) if earned < room => {
                bucket.tokens += earned;
                let consumed_nanos = u128::from(earned) * NANOS_PER_SEC / rate;
                bucket.last_refill +=
                    Duration::from_nanos(u64::try_from(consumed_nanos).unwrap_or(u64::MAX));
            }
            _ => {
                bucket.tokens = self.capacity;
                bucket.last_refill = now;
            }
        }
    }
}

// Verify RateLimiter is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RateLimiter>();
};
