//! Retry policy and backoff computation.

use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

/// How failed attempts are retried.
///
/// # Defaults
///
/// - `max_attempts`: 3 (total attempts, the first one included)
/// - `base_delay`: 1 second
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0
/// - `jitter`: 0.1 (up to 10% added to each delay)
/// - `exponential`: `true`
/// - `respect_retry_after`: `true`
/// - `rate_limit_wait`: 30 seconds
/// - `operation_timeout`: 5 minutes
/// - `enabled`: `true`
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use shopify_pipeline::RetryPolicy;
///
/// let policy = RetryPolicy::builder()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(500))
///     .jitter(0.0)
///     .build()
///     .unwrap();
///
/// assert_eq!(policy.backoff_delay(1), Duration::from_millis(500));
/// assert_eq!(policy.backoff_delay(3), Duration::from_secs(2));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
    exponential: bool,
    respect_retry_after: bool,
    rate_limit_wait: Duration,
    operation_timeout: Duration,
    enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
            exponential: true,
            respect_retry_after: true,
            rate_limit_wait: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(5 * 60),
            enabled: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Total attempts allowed, the first one included.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts allowed once the `enabled` flag is taken into account.
    #[must_use]
    pub const fn effective_max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts
        } else {
            1
        }
    }

    /// Delay before the first retry.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Upper bound on any computed or server-suggested delay.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Growth factor between consecutive delays.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Maximum jitter as a fraction of the delay.
    #[must_use]
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Whether a `Retry-After` hint replaces the computed delay.
    #[must_use]
    pub const fn respect_retry_after(&self) -> bool {
        self.respect_retry_after
    }

    /// How long each attempt may wait for rate limiter admission.
    #[must_use]
    pub const fn rate_limit_wait(&self) -> Duration {
        self.rate_limit_wait
    }

    /// Bound on the whole call, retries and waits included.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Whether failed attempts are retried at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Delay before retry number `retry` (1-indexed), without jitter.
    ///
    /// `base_delay * multiplier^(retry - 1)`, capped at `max_delay`. With
    /// exponential backoff turned off every retry waits `base_delay`.
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        if !self.exponential {
            return self.base_delay.min(self.max_delay);
        }

        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Delay before retry number `retry`, with jitter drawn from `rng`.
    ///
    /// Jitter never pushes the delay past `max_delay`.
    ///
    /// When a `Retry-After` hint is given and respected, it replaces the
    /// computed delay (capped at `max_delay`, no jitter).
    pub fn delay_for<R: Rng + ?Sized>(
        &self,
        retry: u32,
        retry_after: Option<Duration>,
        rng: &mut R,
    ) -> Duration {
        if let (true, Some(hint)) = (self.respect_retry_after, retry_after) {
            return hint.min(self.max_delay);
        }

        let delay = self.backoff_delay(retry);
        if self.jitter <= 0.0 {
            return delay;
        }
        (delay + delay.mul_f64(self.jitter * rng.gen::<f64>())).min(self.max_delay)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Creates a builder starting from [`RetryPolicy::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total number of attempts (at least 1).
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub const fn base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    /// Sets the cap on any delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Sets the growth factor between delays (at least 1.0).
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Sets the jitter fraction (0.0 to 1.0).
    #[must_use]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.policy.jitter = jitter;
        self
    }

    /// Turns exponential growth on or off.
    #[must_use]
    pub const fn exponential(mut self, exponential: bool) -> Self {
        self.policy.exponential = exponential;
        self
    }

    /// Sets whether `Retry-After` hints replace the computed delay.
    #[must_use]
    pub const fn respect_retry_after(mut self, respect: bool) -> Self {
        self.policy.respect_retry_after = respect;
        self
    }

    /// Sets how long each attempt may wait for rate limiter admission.
    #[must_use]
    pub const fn rate_limit_wait(mut self, wait: Duration) -> Self {
        self.policy.rate_limit_wait = wait;
        self
    }

    /// Sets the bound on the whole call.
    #[must_use]
    pub const fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.policy.operation_timeout = timeout;
        self
    }

    /// Enables or disables retries.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.policy.enabled = enabled;
        self
    }

    /// Validates and builds the policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRetryPolicy`] if `max_attempts` is zero,
    /// `multiplier` is below 1.0, `jitter` is outside `0.0..=1.0`,
    /// `base_delay` exceeds `max_delay`, or `operation_timeout` is zero.
    pub fn build(self) -> Result<RetryPolicy, ConfigError> {
        let policy = self.policy;
        let invalid = |reason: &str| ConfigError::InvalidRetryPolicy {
            reason: reason.to_string(),
        };

        if policy.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1"));
        }
        if !(policy.multiplier >= 1.0 && policy.multiplier.is_finite()) {
            return Err(invalid("multiplier must be a finite number of at least 1.0"));
        }
        if !(0.0..=1.0).contains(&policy.jitter) {
            return Err(invalid("jitter must be between 0.0 and 1.0"));
        }
        if policy.base_delay > policy.max_delay {
            return Err(invalid("base_delay must not exceed max_delay"));
        }
        if policy.operation_timeout.is_zero() {
            return Err(invalid("operation_timeout must be greater than zero"));
        }

        Ok(policy)
    }
}
