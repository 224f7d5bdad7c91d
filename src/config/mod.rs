//! Configuration types for the Shopify API pipeline.
//!
//! This module provides the configuration types used to assemble a
//! [`Pipeline`](crate::Pipeline).
//!
//! # Overview
//!
//! The main types in this module are:
//!
//! - [`PipelineConfig`]: The main configuration struct holding all pipeline settings
//! - [`PipelineConfigBuilder`]: A builder for constructing [`PipelineConfig`] instances
//! - [`RateLimitConfig`]: Bucket sizes and refill rates for the REST and GraphQL limiters
//! - [`SessionStoreConfig`]: Capacity and sweep schedule of the in-memory session store
//! - [`ApiKey`], [`ApiSecretKey`], [`ShopDomain`]: Validated newtypes
//! - [`ApiKind`]: Which Shopify API a call targets
//!
//! The retry settings live in [`RetryPolicy`](crate::retry::RetryPolicy).
//!
//! # Example
//!
//! ```rust
//! use shopify_pipeline::{PipelineConfig, ApiKey, ApiSecretKey};
//!
//! let config = PipelineConfig::builder()
//!     .api_key(ApiKey::new("my-api-key").unwrap())
//!     .api_secret_key(ApiSecretKey::new("my-secret").unwrap())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.rate_limits().rest_capacity, 40);
//! ```

mod newtypes;

pub use newtypes::{normalize_shop_domain, ApiKey, ApiSecretKey, ShopDomain};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::AuthScopes;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Default lifetime of an online session.
pub const DEFAULT_ONLINE_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The Shopify API a call targets.
///
/// Each kind owns its own rate limiter and metrics collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    /// The Admin REST API (leaky bucket of 40 calls, 2 per second).
    Rest,
    /// The Admin GraphQL API (cost-based bucket of 1000 points, 10 per second).
    GraphQL,
}

impl ApiKind {
    /// Returns the registry name used for this API's limiter and collector.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::GraphQL => "graphql",
        }
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Token bucket settings for the REST and GraphQL limiters.
///
/// Defaults mirror Shopify's published limits for standard plans.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// REST bucket size. Default: 40.
    pub rest_capacity: u32,
    /// REST tokens restored per second. Default: 2.
    pub rest_refill_rate: u32,
    /// GraphQL bucket size in cost points. Default: 1000.
    pub graphql_capacity: u32,
    /// GraphQL cost points restored per second. Default: 10.
    pub graphql_refill_rate: u32,
}

impl RateLimitConfig {
    /// Checks that every bucket has a positive capacity and refill rate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRateLimit`] naming the offending limiter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bucket(ApiKind::Rest.name(), self.rest_capacity, self.rest_refill_rate)?;
        validate_bucket(
            ApiKind::GraphQL.name(),
            self.graphql_capacity,
            self.graphql_refill_rate,
        )
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rest_capacity: 40,
            rest_refill_rate: 2,
            graphql_capacity: 1000,
            graphql_refill_rate: 10,
        }
    }
}

/// Validates a single token bucket's settings.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidRateLimit`] if `capacity` or `refill_rate` is zero.
pub fn validate_bucket(name: &str, capacity: u32, refill_rate: u32) -> Result<(), ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::InvalidRateLimit {
            name: name.to_string(),
            reason: "capacity must be greater than zero".to_string(),
        });
    }
    if refill_rate == 0 {
        return Err(ConfigError::InvalidRateLimit {
            name: name.to_string(),
            reason: "refill rate must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Settings for [`InMemorySessionStore`](crate::session::InMemorySessionStore).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionStoreConfig {
    /// Maximum number of stored sessions. Default: 10 000.
    pub max_sessions: usize,
    /// Period of the background expiry sweep. Default: 5 minutes.
    pub sweep_interval: Duration,
    /// How long [`shutdown`](crate::session::InMemorySessionStore::shutdown)
    /// waits for the sweep task before aborting it. Default: 5 seconds.
    pub shutdown_timeout: Duration,
}

impl SessionStoreConfig {
    /// Checks the capacity and sweep interval.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSessionStore`] if `max_sessions` or
    /// `sweep_interval` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidSessionStore {
                reason: "max_sessions must be greater than zero".to_string(),
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidSessionStore {
                reason: "sweep_interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            sweep_interval: Duration::from_secs(5 * 60),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration for the Shopify API pipeline.
///
/// Holds the app credentials used to verify session tokens together with
/// the settings of every pipeline component.
///
/// # Thread Safety
///
/// `PipelineConfig` is `Clone`, `Send`, and `Sync`, making it safe to share
/// across threads and async tasks.
///
/// # Key Rotation
///
/// The `old_api_secret_key` field supports seamless key rotation. When
/// verifying session tokens, the primary key is tried first, then the old
/// key if configured.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use shopify_pipeline::{PipelineConfig, ApiKey, ApiSecretKey, RetryPolicy};
///
/// let config = PipelineConfig::builder()
///     .api_key(ApiKey::new("your-api-key").unwrap())
///     .api_secret_key(ApiSecretKey::new("your-secret").unwrap())
///     .retry_policy(RetryPolicy::builder().max_attempts(5).build().unwrap())
///     .online_session_ttl(Duration::from_secs(3600))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.retry_policy().max_attempts(), 5);
/// ```
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    api_key: ApiKey,
    api_secret_key: ApiSecretKey,
    old_api_secret_key: Option<ApiSecretKey>,
    scopes: AuthScopes,
    rate_limits: RateLimitConfig,
    retry_policy: RetryPolicy,
    session_store: SessionStoreConfig,
    online_session_ttl: Duration,
    metrics_enabled: bool,
}

impl PipelineConfig {
    /// Creates a new builder for constructing a `PipelineConfig`.
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Returns the API key.
    #[must_use]
    pub const fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// Returns the API secret key.
    #[must_use]
    pub const fn api_secret_key(&self) -> &ApiSecretKey {
        &self.api_secret_key
    }

    /// Returns the old API secret key, if configured.
    #[must_use]
    pub const fn old_api_secret_key(&self) -> Option<&ApiSecretKey> {
        self.old_api_secret_key.as_ref()
    }

    /// Returns the scopes the app requests.
    #[must_use]
    pub const fn scopes(&self) -> &AuthScopes {
        &self.scopes
    }

    /// Returns the rate limiter settings.
    #[must_use]
    pub const fn rate_limits(&self) -> &RateLimitConfig {
        &self.rate_limits
    }

    /// Returns the retry policy applied to every call.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the session store settings.
    #[must_use]
    pub const fn session_store(&self) -> &SessionStoreConfig {
        &self.session_store
    }

    /// Returns the lifetime given to newly created online sessions.
    #[must_use]
    pub const fn online_session_ttl(&self) -> Duration {
        self.online_session_ttl
    }

    /// Returns whether call outcomes are recorded in the metrics registry.
    #[must_use]
    pub const fn metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }
}

// Verify PipelineConfig is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<PipelineConfig>();
};

/// Builder for constructing [`PipelineConfig`] instances.
///
/// Required fields are `api_key` and `api_secret_key`.
///
/// # Defaults
///
/// - `scopes`: Empty
/// - `rate_limits`: [`RateLimitConfig::default`]
/// - `retry_policy`: [`RetryPolicy::default`]
/// - `session_store`: [`SessionStoreConfig::default`]
/// - `online_session_ttl`: 24 hours
/// - `metrics_enabled`: `true`
/// - `old_api_secret_key`: `None`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    api_key: Option<ApiKey>,
    api_secret_key: Option<ApiSecretKey>,
    old_api_secret_key: Option<ApiSecretKey>,
    scopes: Option<AuthScopes>,
    rate_limits: Option<RateLimitConfig>,
    retry_policy: Option<RetryPolicy>,
    session_store: Option<SessionStoreConfig>,
    online_session_ttl: Option<Duration>,
    metrics_enabled: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key (required).
    #[must_use]
    pub fn api_key(mut self, key: ApiKey) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Sets the API secret key (required).
    #[must_use]
    pub fn api_secret_key(mut self, key: ApiSecretKey) -> Self {
        self.api_secret_key = Some(key);
        self
    }

    /// Sets the previous API secret key, accepted while keys are rotated.
    #[must_use]
    pub fn old_api_secret_key(mut self, key: ApiSecretKey) -> Self {
        self.old_api_secret_key = Some(key);
        self
    }

    /// Sets the scopes the app requests.
    #[must_use]
    pub fn scopes(mut self, scopes: AuthScopes) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Sets the rate limiter settings.
    #[must_use]
    pub const fn rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = Some(rate_limits);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the session store settings.
    #[must_use]
    pub const fn session_store(mut self, session_store: SessionStoreConfig) -> Self {
        self.session_store = Some(session_store);
        self
    }

    /// Sets the lifetime of newly created online sessions.
    #[must_use]
    pub const fn online_session_ttl(mut self, ttl: Duration) -> Self {
        self.online_session_ttl = Some(ttl);
        self
    }

    /// Enables or disables metrics recording.
    #[must_use]
    pub const fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = Some(enabled);
        self
    }

    /// Builds the [`PipelineConfig`], validating every component's settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequiredField`] if `api_key` or
    /// `api_secret_key` are not set, and the component's validation error if
    /// the rate limit or session store settings are invalid or the online
    /// session TTL is zero.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let api_key = self
            .api_key
            .ok_or(ConfigError::MissingRequiredField { field: "api_key" })?;
        let api_secret_key = self
            .api_secret_key
            .ok_or(ConfigError::MissingRequiredField {
                field: "api_secret_key",
            })?;

        let rate_limits = self.rate_limits.unwrap_or_default();
        rate_limits.validate()?;

        let session_store = self.session_store.unwrap_or_default();
        session_store.validate()?;

        let online_session_ttl = self.online_session_ttl.unwrap_or(DEFAULT_ONLINE_SESSION_TTL);
        if online_session_ttl.is_zero() {
            return Err(ConfigError::InvalidSessionStore {
                reason: "online_session_ttl must be greater than zero".to_string(),
            });
        }

        Ok(PipelineConfig {
            api_key,
            api_secret_key,
            old_api_secret_key: self.old_api_secret_key,
            scopes: self.scopes.unwrap_or_default(),
            rate_limits,
            retry_policy: self.retry_policy.unwrap_or_default(),
            session_store,
            online_session_ttl,
            metrics_enabled: self.metrics_enabled.unwrap_or(true),
        })
    }
}
