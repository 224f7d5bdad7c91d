//! The call pipeline facade.
//!
//! [`Pipeline`] wires the components together for the common case: look up
//! and validate the caller's session, then run the call through the
//! retrying executor of the targeted API, which waits for rate limiter
//! admission before every attempt and records each outcome in the
//! `"global"` collector and the API's own collector.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::{AuthScopes, JwtTokenVerifier};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{ApiKind, PipelineConfig};
use crate::error::{ConfigError, PipelineError};
use crate::metrics::MetricsRegistry;
use crate::ratelimit::RateLimiters;
use crate::retry::{AttemptContext, AttemptFailure, RetryingExecutor};
use crate::session::{InMemorySessionStore, Session, SessionManager, SessionStore};

/// Session validation, rate limiting, retry and metrics for Shopify API calls.
///
/// # Example
///
/// ```rust,ignore
/// use shopify_pipeline::{ApiKind, Pipeline, PipelineConfig};
/// use shopify_pipeline::retry::AttemptFailure;
///
/// let pipeline = Pipeline::spawn(config)?;
///
/// let products = pipeline
///     .execute(&session_id, ApiKind::Rest, "products.list", None, |session, _ctx| {
///         let token = session.access_token.clone();
///         async move {
///             let response = transport.get("products.json", &token).await
///                 .map_err(|e| AttemptFailure::network(e.to_string()))?;
///             if let Some(limit) = response.header("X-Shopify-Shop-Api-Call-Limit") {
///                 limiters.update_rest_from_header(limit);
///             }
///             if response.status >= 400 {
///                 return Err(AttemptFailure::from_status(response.status, response.body));
///             }
///             Ok(response.body)
///         }
///     })
///     .await?;
///
/// pipeline.shutdown().await;
/// ```
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    limiters: Arc<RateLimiters>,
    metrics: Arc<MetricsRegistry>,
    sessions: SessionManager,
    memory_store: Option<Arc<InMemorySessionStore>>,
}

impl Pipeline {
    /// Builds a pipeline on real time with an in-memory session store whose
    /// expiry sweep runs in the background.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a component rejects its settings.
    pub fn spawn(config: PipelineConfig) -> Result<Self, ConfigError> {
        Self::spawn_with_clock(config, SystemClock::shared())
    }

    /// Like [`spawn`](Self::spawn), with every component reading `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a component rejects its settings.
    pub fn spawn_with_clock(config: PipelineConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        let store = Arc::new(InMemorySessionStore::spawn(
            *config.session_store(),
            Arc::clone(&clock),
        )?);
        let mut pipeline = Self::with_store(config, Arc::clone(&store) as Arc<dyn SessionStore>, clock)?;
        pipeline.memory_store = Some(store);
        Ok(pipeline)
    }

    /// Builds a pipeline on a caller-provided session store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a component rejects its settings.
    pub fn with_store(
        config: PipelineConfig,
        store: Arc<dyn SessionStore>,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        let limiters = RateLimiters::with_clock(config.rate_limits(), Arc::clone(&clock))?;

        let metrics = MetricsRegistry::with_clock(Arc::clone(&clock));
        if !config.metrics_enabled() {
            metrics.disable();
        }

        let sessions = SessionManager::new(store, Arc::new(JwtTokenVerifier::from_config(&config)))
            .with_clock(clock)
            .with_online_session_ttl(config.online_session_ttl());

        tracing::debug!(
            rest_capacity = config.rate_limits().rest_capacity,
            graphql_capacity = config.rate_limits().graphql_capacity,
            max_attempts = config.retry_policy().effective_max_attempts(),
            metrics_enabled = config.metrics_enabled(),
            "Pipeline assembled"
        );

        Ok(Self {
            config,
            limiters: Arc::new(limiters),
            metrics: Arc::new(metrics),
            sessions,
            memory_store: None,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the rate limiters, for syncing from response headers.
    #[must_use]
    pub const fn limiters(&self) -> &Arc<RateLimiters> {
        &self.limiters
    }

    /// Returns the metrics registry.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Returns the session manager.
    #[must_use]
    pub const fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Returns an executor for `api`, reporting to the API's collector and
    /// the global collector.
    #[must_use]
    pub fn executor(&self, api: ApiKind) -> RetryingExecutor {
        RetryingExecutor::new(self.limiters.for_api(api), self.metrics.for_api(api))
            .also_report_to(self.metrics.global())
    }

    /// Runs one call for the session `session_id` against `api`.
    ///
    /// The session must be valid and, when `required_scopes` is given, hold
    /// every one of them. Each attempt receives the session.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Session`] if the session is missing, expired or
    ///   lacks scopes; no attempt is made
    /// - [`PipelineError::Retry`] if the call fails in the executor
    pub async fn execute<T, F, Fut>(
        &self,
        session_id: &str,
        api: ApiKind,
        operation: &str,
        required_scopes: Option<&AuthScopes>,
        attempt: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut(&Session, AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, AttemptFailure>>,
    {
        let never = CancellationToken::new();
        self.execute_with_cancellation(&never, session_id, api, operation, required_scopes, attempt)
            .await
    }

    /// Like [`execute`](Self::execute), but stops as soon as `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute); cancellation surfaces as
    /// [`RetryError::Cancelled`](crate::retry::RetryError::Cancelled).
    pub async fn execute_with_cancellation<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
        api: ApiKind,
        operation: &str,
        required_scopes: Option<&AuthScopes>,
        mut attempt: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut(&Session, AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, AttemptFailure>>,
    {
        let session = self.sessions.validate_session(session_id).await?;
        if let Some(required) = required_scopes {
            self.sessions.validate_scopes(&session, required)?;
        }

        let value = self
            .executor(api)
            .execute_with_cancellation(cancel, self.config.retry_policy(), operation, |ctx| {
                attempt(&session, ctx)
            })
            .await?;
        Ok(value)
    }

    /// Stops the session store's background sweep, if this pipeline owns one.
    pub async fn shutdown(&self) {
        if let Some(store) = &self.memory_store {
            store.shutdown().await;
        }
        self.metrics.log_summary();
    }
}

// Verify Pipeline is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Pipeline>();
};
