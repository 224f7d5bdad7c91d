//! Session error types.

use thiserror::Error;

/// Errors raised by [`SessionStore`](crate::session::SessionStore)
/// implementations and [`SessionManager`](crate::session::SessionManager).
///
/// # Example
///
/// ```rust
/// use shopify_pipeline::session::SessionError;
///
/// let error = SessionError::InsufficientScopes {
///     id: "offline_my-store".to_string(),
///     missing: vec!["write_orders".to_string()],
/// };
/// assert!(error.to_string().contains("write_orders"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No valid session exists under this ID (missing, expired or without a token).
    #[error("Invalid or expired session: {id}")]
    InvalidSession {
        /// The session ID that was looked up.
        id: String,
    },

    /// The session lacks scopes the call requires.
    #[error("Session {id} is missing required scopes: {}", missing.join(","))]
    InsufficientScopes {
        /// The session ID.
        id: String,
        /// Required scopes the session was not granted, sorted.
        missing: Vec<String>,
    },

    /// The store is full even after removing expired sessions.
    #[error("Session store has reached maximum capacity of {max_sessions} sessions")]
    StoreCapacityExceeded {
        /// The configured capacity.
        max_sessions: usize,
    },

    /// An update targeted a session that is not stored.
    #[error("Cannot update unknown session: {id}")]
    UnknownSession {
        /// The session ID.
        id: String,
    },

    /// A session token failed verification.
    #[error("Invalid session token: {reason}")]
    InvalidToken {
        /// Why verification failed.
        reason: String,
    },

    /// The shop is not a valid Shopify shop domain.
    #[error("Invalid shop domain: '{shop}'")]
    InvalidShop {
        /// The shop as given.
        shop: String,
    },

    /// An online session was requested but the token response has no user.
    #[error("Cannot create an online session for {shop} without an associated user")]
    MissingAssociatedUser {
        /// The normalized shop.
        shop: String,
    },
}

// Verify SessionError is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SessionError>();
};
