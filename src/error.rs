//! Error types for the Shopify API pipeline.
//!
//! This module contains the configuration error type and the top-level
//! [`PipelineError`] returned by [`Pipeline`](crate::Pipeline). Component
//! errors live next to their components:
//!
//! - [`RateLimitError`](crate::ratelimit::RateLimitError) for admission failures
//! - [`RetryError`](crate::retry::RetryError) for retry decisions and exhaustion
//! - [`SessionError`](crate::session::SessionError) for session lookups and storage
//!
//! # Error Handling
//!
//! All configuration constructors return `Result<T, ConfigError>` to enable
//! fail-fast validation. Error messages are designed to be clear and actionable.
//!
//! # Example
//!
//! ```rust
//! use shopify_pipeline::{ApiKey, ConfigError};
//!
//! let result = ApiKey::new("");
//! assert!(matches!(result, Err(ConfigError::EmptyApiKey)));
//! ```

use thiserror::Error;

use crate::retry::RetryError;
use crate::session::SessionError;

/// Errors that can occur during pipeline configuration.
///
/// Each variant provides a clear, actionable error message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// API key cannot be empty.
    #[error("API key cannot be empty. Please provide a valid Shopify API key.")]
    EmptyApiKey,

    /// API secret key cannot be empty.
    #[error("API secret key cannot be empty. Please provide a valid Shopify API secret key.")]
    EmptyApiSecretKey,

    /// A required configuration field is missing.
    #[error("Missing required field: {field}. Please set this field before building.")]
    MissingRequiredField {
        /// The name of the missing field.
        field: &'static str,
    },

    /// Shop domain is invalid.
    #[error("Invalid shop domain '{domain}'. Expected format: 'shop-name' or 'shop-name.myshopify.com'.")]
    InvalidShopDomain {
        /// The invalid domain that was provided.
        domain: String,
    },

    /// Scopes are invalid.
    #[error("Invalid scopes: {reason}")]
    InvalidScopes {
        /// The reason the scopes are invalid.
        reason: String,
    },

    /// Rate limiter settings are invalid.
    #[error("Invalid rate limiter '{name}': {reason}")]
    InvalidRateLimit {
        /// The name of the limiter being configured.
        name: String,
        /// The reason the settings are invalid.
        reason: String,
    },

    /// Retry policy settings are invalid.
    #[error("Invalid retry policy: {reason}")]
    InvalidRetryPolicy {
        /// The reason the policy is invalid.
        reason: String,
    },

    /// Session store settings are invalid.
    #[error("Invalid session store configuration: {reason}")]
    InvalidSessionStore {
        /// The reason the settings are invalid.
        reason: String,
    },
}

/// Unified error type for calls made through [`Pipeline`](crate::Pipeline).
///
/// A call either fails before the first attempt because no usable session
/// exists, or fails inside the retrying executor.
///
/// # Example
///
/// ```rust,ignore
/// match pipeline.execute(&session_id, ApiKind::Rest, "products.list", None, attempt).await {
///     Ok(body) => { /* handle success */ }
///     Err(PipelineError::Session(SessionError::InvalidSession { .. })) => { /* re-authenticate */ }
///     Err(PipelineError::Retry(e)) => { /* inspect e.last_failure() */ }
///     Err(e) => { /* other session errors */ }
/// }
/// ```
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The session could not be loaded or lacks required scopes.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The call failed inside the retrying executor.
    #[error(transparent)]
    Retry(#[from] RetryError),
}

// Verify error types are Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ConfigError>();
    assert_send_sync::<PipelineError>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_api_key_error_message() {
        let error = ConfigError::EmptyApiKey;
        let message = error.to_string();
        assert!(message.contains("API key cannot be empty"));
        assert!(message.contains("valid Shopify API key"));
    }

    #[test]
    fn test_invalid_shop_domain_error_message() {
        let error = ConfigError::InvalidShopDomain {
            domain: "bad domain!".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("bad domain!"));
        assert!(message.contains("Expected format"));
    }

    #[test]
    fn test_invalid_rate_limit_names_the_limiter() {
        let error = ConfigError::InvalidRateLimit {
            name: "rest".to_string(),
            reason: "capacity must be greater than zero".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("'rest'"));
        assert!(message.contains("capacity"));
    }

    #[test]
    fn test_pipeline_error_wraps_session_error() {
        let error: PipelineError = SessionError::InvalidSession {
            id: "offline_shop".to_string(),
        }
        .into();
        assert!(matches!(error, PipelineError::Session(_)));
        assert!(error.to_string().contains("offline_shop"));
    }

    #[test]
    fn test_error_implements_std_error() {
        let error = ConfigError::EmptyApiKey;
        let _: &dyn std::error::Error = &error;
    }
}
