//! Failure classification and retry error types.
//!
//! The transport layer reports each failed attempt as an [`AttemptFailure`]
//! carrying a [`FailureKind`]. Retry decisions are made on the kind alone,
//! never on message text.
//!
//! - [`AttemptFailure`]: One failed attempt, as reported by the caller
//! - [`MaxRetriesExceededError`]: Every allowed attempt failed with a retryable failure
//! - [`RetryError`]: Unified error type returned by the executor
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use shopify_pipeline::retry::{AttemptFailure, FailureKind};
//!
//! let failure = AttemptFailure::from_status(429, r#"{"errors":"Exceeded 2 calls per second"}"#)
//!     .with_retry_after(Duration::from_secs(2));
//!
//! assert_eq!(failure.kind, FailureKind::RateLimited);
//! assert!(failure.is_retryable());
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ratelimit::RateLimitError;

/// Classification of a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// HTTP 429, or local admission refused.
    RateLimited,
    /// HTTP 5xx.
    ServerError,
    /// HTTP 4xx other than 401, 403 and 429.
    ClientError,
    /// HTTP 401 or 403.
    Authentication,
    /// Connection failures and other transport I/O errors.
    Network,
    /// The attempt did not complete in time.
    Timeout,
}

impl FailureKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::RateLimited,
        Self::ServerError,
        Self::ClientError,
        Self::Authentication,
        Self::Network,
        Self::Timeout,
    ];

    /// Classifies an HTTP status code.
    ///
    /// Returns `None` for statuses below 400 or above 599.
    ///
    /// # Example
    ///
    /// ```rust
    /// use shopify_pipeline::retry::FailureKind;
    ///
    /// assert_eq!(FailureKind::from_status(403), Some(FailureKind::Authentication));
    /// assert_eq!(FailureKind::from_status(503), Some(FailureKind::ServerError));
    /// assert_eq!(FailureKind::from_status(422), Some(FailureKind::ClientError));
    /// assert_eq!(FailureKind::from_status(200), None);
    /// ```
    #[must_use]
    pub const fn from_status(status: u16) -> Option<Self> {
        match status {
            401 | 403 => Some(Self::Authentication),
            429 => Some(Self::RateLimited),
            400..=499 => Some(Self::ClientError),
            500..=599 => Some(Self::ServerError),
            _ => None,
        }
    }

    /// Whether a failure of this kind may succeed when attempted again.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::Network | Self::Timeout
        )
    }

    /// Returns a stable snake_case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::Authentication => "authentication",
            Self::Network => "network",
            Self::Timeout => "timeout",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed attempt.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub struct AttemptFailure {
    /// How the attempt failed.
    pub kind: FailureKind,
    /// Human-readable detail, typically the serialized error body.
    pub message: String,
    /// The HTTP status code, when the failure came from a response.
    pub status: Option<u16>,
    /// The server's `Retry-After` hint, when present.
    pub retry_after: Option<Duration>,
}

impl AttemptFailure {
    /// Creates a failure of `kind`.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    /// Creates a failure from an HTTP response status.
    ///
    /// Statuses outside the 4xx and 5xx ranges are classified as
    /// [`FailureKind::ClientError`].
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(
                FailureKind::from_status(status).unwrap_or(FailureKind::ClientError),
                message,
            )
        }
    }

    /// Creates a transport-level failure.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    /// Creates a failure for an attempt that timed out.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// Attaches a `Retry-After` hint.
    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Whether this failure may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({status}): {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Error returned when every allowed attempt failed with a retryable failure.
///
/// # Example
///
/// ```rust
/// use shopify_pipeline::retry::{AttemptFailure, MaxRetriesExceededError};
///
/// let error = MaxRetriesExceededError {
///     attempts: 3,
///     last_failure: AttemptFailure::from_status(503, "Service Unavailable"),
/// };
///
/// assert!(error.to_string().starts_with("Exceeded maximum retry count of 3"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("Exceeded maximum retry count of {attempts}. Last failure: {last_failure}")]
pub struct MaxRetriesExceededError {
    /// The number of attempts made.
    pub attempts: u32,
    /// The failure of the final attempt.
    #[source]
    pub last_failure: AttemptFailure,
}

/// Unified error type returned by [`RetryingExecutor`](crate::retry::RetryingExecutor).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RetryError {
    /// Every allowed attempt failed with a retryable failure.
    #[error(transparent)]
    MaxRetriesExceeded(#[from] MaxRetriesExceededError),

    /// An attempt failed with a non-retryable failure.
    #[error("Request failed: {0}")]
    Failed(#[source] AttemptFailure),

    /// The rate limiter refused admission a second time within one call.
    #[error("Rate limiter refused admission: {0}")]
    RateLimitTimeout(#[source] RateLimitError),

    /// The whole call exceeded the policy's operation timeout.
    #[error("Operation timed out after {elapsed:?} ({attempts} attempts)")]
    OperationTimeout {
        /// Time spent before giving up.
        elapsed: Duration,
        /// Attempts started before giving up.
        attempts: u32,
    },

    /// The call was cancelled by its caller.
    #[error("Operation cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts started before cancellation.
        attempts: u32,
    },
}

impl RetryError {
    /// Returns the last attempt failure, if the call got that far.
    #[must_use]
    pub const fn last_failure(&self) -> Option<&AttemptFailure> {
        match self {
            Self::MaxRetriesExceeded(err) => Some(&err.last_failure),
            Self::Failed(failure) => Some(failure),
            Self::RateLimitTimeout(_) | Self::OperationTimeout { .. } | Self::Cancelled { .. } => {
                None
            }
        }
    }

    /// Whether the caller cancelled the call.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

// Verify error types are Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<AttemptFailure>();
    assert_send_sync::<MaxRetriesExceededError>();
    assert_send_sync::<RetryError>();
};
