//! Retry with exponential backoff.
//!
//! # Overview
//!
//! - [`RetryPolicy`]: Attempt count, backoff shape, jitter and timeouts
//! - [`RetryingExecutor`]: Runs a caller-supplied attempt under a policy,
//!   gated by a rate limiter and reported to metrics collectors
//! - [`AttemptFailure`] / [`FailureKind`]: How the caller reports a failed attempt
//! - [`RetryError`]: Why a call ultimately failed
//!
//! Only [`FailureKind::RateLimited`], [`FailureKind::ServerError`],
//! [`FailureKind::Network`] and [`FailureKind::Timeout`] failures are retried.

mod errors;
mod executor;
mod policy;

pub use errors::{AttemptFailure, FailureKind, MaxRetriesExceededError, RetryError};
pub use executor::{AttemptContext, RetryingExecutor};
pub use policy::{RetryPolicy, RetryPolicyBuilder};
