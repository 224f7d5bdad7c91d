//! Client-side rate limiting for Shopify API calls.
//!
//! Shopify enforces a leaky bucket per app and shop: 40 REST calls refilled
//! at 2 per second, and 1000 GraphQL cost points refilled at 10 per second.
//! This module keeps a local token bucket per API so callers wait before
//! sending instead of collecting `429 Too Many Requests` responses.
//!
//! # Overview
//!
//! - [`RateLimiter`]: A token bucket with lazy refill
//! - [`RateLimiters`]: The named `"rest"` / `"graphql"` / custom limiters,
//!   plus synchronization from Shopify's reported budget
//! - [`RateLimitError`]: Admission failures
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use shopify_pipeline::ratelimit::RateLimiters;
//!
//! let limiters = RateLimiters::new(config.rate_limits())?;
//!
//! // Wait up to 30 seconds for a REST token
//! limiters.rest().acquire_timeout(Duration::from_secs(30)).await?;
//!
//! // After the response arrives
//! limiters.update_rest_from_header(call_limit_header);
//! ```

mod errors;
mod limiter;
mod registry;

pub use errors::RateLimitError;
pub use limiter::{RateLimiter, RateLimiterState};
pub use registry::{CallLimit, RateLimitStatus, RateLimiters};
