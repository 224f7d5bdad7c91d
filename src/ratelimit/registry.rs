//! Named rate limiters shared by the pipeline.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::clock::{SharedClock, SystemClock};
use crate::config::{ApiKind, RateLimitConfig};
use crate::error::ConfigError;
use crate::ratelimit::{RateLimiter, RateLimiterState};

/// REST buckets with fewer tokens than this are reported as throttled.
const REST_THROTTLE_THRESHOLD: u32 = 5;

/// GraphQL buckets with fewer cost points than this are reported as throttled.
const GRAPHQL_THROTTLE_THRESHOLD: u32 = 100;

/// Usage parsed from the `X-Shopify-Shop-Api-Call-Limit` header.
///
/// The header format is "X/Y" where X is the number of calls in the bucket
/// and Y is the bucket size.
///
/// # Example
///
/// ```rust
/// use shopify_pipeline::ratelimit::CallLimit;
///
/// let limit = CallLimit::parse("32/40").unwrap();
/// assert_eq!(limit.remaining(), 8);
/// assert!(CallLimit::parse("32").is_none());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallLimit {
    /// Calls currently counted against the bucket.
    pub used: u32,
    /// The bucket size.
    pub bucket_size: u32,
}

impl CallLimit {
    /// Parses an "X/Y" header value.
    #[must_use]
    pub fn parse(header_value: &str) -> Option<Self> {
        let (used, size) = header_value.trim().split_once('/')?;
        Some(Self {
            used: used.trim().parse().ok()?,
            bucket_size: size.trim().parse().ok()?,
        })
    }

    /// Calls left before the bucket is full.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.bucket_size.saturating_sub(self.used)
    }
}

/// Snapshot of the REST and GraphQL limiters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// REST limiter state.
    pub rest: RateLimiterState,
    /// GraphQL limiter state.
    pub graphql: RateLimiterState,
}

impl RateLimitStatus {
    /// Whether fewer than 5 REST calls are available.
    #[must_use]
    pub const fn is_rest_throttled(&self) -> bool {
        self.rest.available_tokens < REST_THROTTLE_THRESHOLD
    }

    /// Whether fewer than 100 GraphQL cost points are available.
    #[must_use]
    pub const fn is_graphql_throttled(&self) -> bool {
        self.graphql.available_tokens < GRAPHQL_THROTTLE_THRESHOLD
    }

    /// Whether either API is throttled.
    #[must_use]
    pub const fn is_any_throttled(&self) -> bool {
        self.is_rest_throttled() || self.is_graphql_throttled()
    }
}

/// Registry of named rate limiters.
///
/// Always holds a `"rest"` and a `"graphql"` limiter built from
/// [`RateLimitConfig`]; custom limiters can be registered alongside them.
/// Limiters are handed out as `Arc`s so every caller shares one bucket.
///
/// # Example
///
/// ```rust
/// use shopify_pipeline::ratelimit::RateLimiters;
/// use shopify_pipeline::RateLimitConfig;
///
/// let limiters = RateLimiters::new(&RateLimitConfig::default()).unwrap();
///
/// assert!(limiters.update_rest_from_header("32/40"));
/// assert_eq!(limiters.rest().available_tokens(), 8);
/// ```
#[derive(Debug)]
pub struct RateLimiters {
    limiters: DashMap<String, Arc<RateLimiter>>,
    rest: Arc<RateLimiter>,
    graphql: Arc<RateLimiter>,
    clock: SharedClock,
}

impl RateLimiters {
    /// Creates the registry with real time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRateLimit`] if `config` is invalid.
    pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Creates the registry with `clock` shared by every limiter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRateLimit`] if `config` is invalid.
    pub fn with_clock(config: &RateLimitConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        let rest = Arc::new(RateLimiter::with_clock(
            ApiKind::Rest.name(),
            config.rest_capacity,
            config.rest_refill_rate,
            Arc::clone(&clock),
        )?);
        let graphql = Arc::new(RateLimiter::with_clock(
            ApiKind::GraphQL.name(),
            config.graphql_capacity,
            config.graphql_refill_rate,
            Arc::clone(&clock),
        )?);

        let limiters = DashMap::new();
        limiters.insert(ApiKind::Rest.name().to_string(), Arc::clone(&rest));
        limiters.insert(ApiKind::GraphQL.name().to_string(), Arc::clone(&graphql));

        Ok(Self {
            limiters,
            rest,
            graphql,
            clock,
        })
    }

    /// Returns the REST limiter.
    #[must_use]
    pub fn rest(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rest)
    }

    /// Returns the GraphQL limiter.
    #[must_use]
    pub fn graphql(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.graphql)
    }

    /// Returns the limiter for `api`.
    #[must_use]
    pub fn for_api(&self, api: ApiKind) -> Arc<RateLimiter> {
        match api {
            ApiKind::Rest => self.rest(),
            ApiKind::GraphQL => self.graphql(),
        }
    }

    /// Returns the limiter registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Registers a custom limiter, replacing any limiter with the same name.
    ///
    /// The built-in `"rest"` and `"graphql"` limiters cannot be replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRateLimit`] if the settings are invalid
    /// or `name` is reserved.
    pub fn register(
        &self,
        name: impl Into<String>,
        capacity: u32,
        refill_rate: u32,
    ) -> Result<Arc<RateLimiter>, ConfigError> {
        let name = name.into();
        if name == ApiKind::Rest.name() || name == ApiKind::GraphQL.name() {
            return Err(ConfigError::InvalidRateLimit {
                name,
                reason: "name is reserved for a built-in limiter".to_string(),
            });
        }

        let limiter = Arc::new(RateLimiter::with_clock(
            name.clone(),
            capacity,
            refill_rate,
            Arc::clone(&self.clock),
        )?);
        self.limiters.insert(name.clone(), Arc::clone(&limiter));
        tracing::debug!(limiter = %name, capacity, refill_rate, "Registered rate limiter");
        Ok(limiter)
    }

    /// Aligns the REST limiter with an `X-Shopify-Shop-Api-Call-Limit` value.
    ///
    /// Returns `false` and leaves the limiter untouched if the value cannot
    /// be parsed.
    pub fn update_rest_from_header(&self, header_value: &str) -> bool {
        let Some(limit) = CallLimit::parse(header_value) else {
            tracing::warn!(header = header_value, "Failed to parse REST API call limit header");
            return false;
        };

        self.rest.sync_from_remote(limit.remaining(), limit.bucket_size);
        true
    }

    /// Aligns the GraphQL limiter with a response's `extensions` object.
    ///
    /// Reads `cost.throttleStatus.currentlyAvailable` and
    /// `cost.throttleStatus.maximumAvailable`. Returns `false` if either is
    /// missing or not a number.
    pub fn update_graphql_from_extensions(&self, extensions: &Value) -> bool {
        let status = &extensions["cost"]["throttleStatus"];
        let (Some(available), Some(maximum)) = (
            status["currentlyAvailable"].as_f64(),
            status["maximumAvailable"].as_f64(),
        ) else {
            return false;
        };

        self.graphql
            .sync_from_remote(clamp_to_u32(available), clamp_to_u32(maximum));
        true
    }

    /// Returns the REST and GraphQL limiter states.
    #[must_use]
    pub fn status(&self) -> RateLimitStatus {
        RateLimitStatus {
            rest: self.rest.state(),
            graphql: self.graphql.state(),
        }
    }

    /// Refills every registered limiter.
    pub fn reset_all(&self) {
        for entry in &self.limiters {
            entry.value().reset();
        }
        tracing::info!(count = self.limiters.len(), "Reset all rate limiters");
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_to_u32(value: f64) -> u32 {
    // Float-to-int `as` casts saturate and map NaN to zero
    value.floor() as u32
}

// Verify RateLimiters is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RateLimiters>();
};
