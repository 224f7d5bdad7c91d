//! Rate limiter error types.

use std::time::Duration;

use thiserror::Error;

/// Errors returned when a rate limiter does not admit a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// No token became available within the caller's wait budget.
    #[error("Rate limiter '{limiter}' did not admit the request within {waited:?}")]
    Timeout {
        /// Name of the limiter that refused admission.
        limiter: String,
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The requested cost can never be satisfied by this bucket.
    #[error("Requested cost {cost} exceeds capacity {capacity} of rate limiter '{limiter}'")]
    CostExceedsCapacity {
        /// Name of the limiter.
        limiter: String,
        /// The requested number of tokens.
        cost: u32,
        /// The bucket's capacity.
        capacity: u32,
    },
}

// Verify RateLimitError is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RateLimitError>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_limiter() {
        let error = RateLimitError::Timeout {
            limiter: "graphql".to_string(),
            waited: Duration::from_millis(250),
        };
        let message = error.to_string();
        assert!(message.contains("'graphql'"));
        assert!(message.contains("250ms"));
    }

    #[test]
    fn test_cost_exceeds_capacity_message() {
        let error = RateLimitError::CostExceedsCapacity {
            limiter: "graphql".to_string(),
            cost: 1500,
            capacity: 1000,
        };
        assert!(error.to_string().contains("1500"));
        assert!(error.to_string().contains("1000"));
    }
}
