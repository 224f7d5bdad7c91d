//! # Shopify API Pipeline
//!
//! The client-side call pipeline of a Shopify app: rate limiting, retry with
//! backoff, session management and call metrics, independent of any HTTP
//! transport.
//!
//! ## Overview
//!
//! This crate provides:
//! - Type-safe configuration via [`PipelineConfig`] and [`PipelineConfigBuilder`]
//! - Validated newtypes for API credentials and shop domains
//! - Token bucket rate limiters for the REST and GraphQL Admin APIs via [`ratelimit`]
//! - A retrying executor with exponential backoff and jitter via [`retry`]
//! - Session storage, expiry and scope validation via [`session`]
//! - Lock-free call metrics via [`metrics`]
//! - A [`Pipeline`] facade wiring them together
//!
//! The transport stays with the caller: each call supplies a closure that
//! performs one HTTP attempt and classifies its failure as an
//! [`AttemptFailure`](retry::AttemptFailure).
//!
//! ## Quick Start
//!
//! ```rust
//! use shopify_pipeline::{PipelineConfig, ApiKey, ApiSecretKey, RetryPolicy};
//!
//! let config = PipelineConfig::builder()
//!     .api_key(ApiKey::new("your-api-key").unwrap())
//!     .api_secret_key(ApiSecretKey::new("your-api-secret").unwrap())
//!     .scopes("read_products,write_orders".parse().unwrap())
//!     .retry_policy(RetryPolicy::builder().max_attempts(4).build().unwrap())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.retry_policy().max_attempts(), 4);
//! ```
//!
//! ## Making Calls
//!
//! ```rust,ignore
//! use shopify_pipeline::{ApiKind, Pipeline};
//! use shopify_pipeline::auth::AccessTokenResponse;
//! use shopify_pipeline::retry::AttemptFailure;
//!
//! let pipeline = Pipeline::spawn(config)?;
//!
//! // After the OAuth exchange completes
//! let response: AccessTokenResponse = serde_json::from_str(&body)?;
//! let session = pipeline.sessions().create_session("my-store", &response, false).await?;
//!
//! let shop = pipeline
//!     .execute(&session.id, ApiKind::Rest, "shop.get", None, |session, _ctx| {
//!         let token = session.access_token.clone();
//!         async move {
//!             transport.get("shop.json", &token).await.map_err(classify)
//!         }
//!     })
//!     .await?;
//! ```
//!
//! ## Monitoring
//!
//! ```rust,ignore
//! let report = pipeline.metrics().report();
//! if report.global.has_high_failure_rate() {
//!     tracing::warn!(failure_rate = report.global.failure_rate, "Shopify calls degraded");
//! }
//!
//! let status = pipeline.limiters().status();
//! println!("REST tokens left: {}", status.rest.available_tokens);
//! ```
//!
//! ## Design Principles
//!
//! - **No global state**: Limiters, collectors and stores are owned values passed explicitly
//! - **Fail-fast validation**: Configuration and newtypes validate on construction
//! - **Thread-safe**: All types are `Send + Sync`
//! - **Async-first**: Designed for use with the Tokio async runtime
//! - **Testable time**: Every time-dependent component reads a [`clock::Clock`]

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod ratelimit;
pub mod retry;
pub mod session;

// Re-export public types at crate root for convenience
pub use auth::{AccessTokenResponse, AssociatedUser, AuthScopes};
pub use config::{
    normalize_shop_domain, ApiKey, ApiKind, ApiSecretKey, PipelineConfig, PipelineConfigBuilder,
    RateLimitConfig, SessionStoreConfig, ShopDomain,
};
pub use error::{ConfigError, PipelineError};
pub use pipeline::Pipeline;
pub use retry::RetryPolicy;
pub use session::{Session, SessionError};
