//! Credential exchange results.
//!
//! The transport layer exchanges an authorization code or session token for
//! an access token and hands the decoded result to
//! [`SessionManager::create_session`](crate::session::SessionManager::create_session).
//! This module only models that result; performing the exchange is the
//! caller's concern.
//!
//! # Example
//!
//! ```rust
//! use shopify_pipeline::auth::AccessTokenResponse;
//!
//! let json = r#"{
//!     "access_token": "shpua_123",
//!     "scope": "write_orders",
//!     "associated_user_scope": "read_orders",
//!     "associated_user": {
//!         "id": 902541635,
//!         "first_name": "John",
//!         "last_name": "Smith",
//!         "email": "john@example.com",
//!         "email_verified": true,
//!         "account_owner": true,
//!         "locale": "en",
//!         "collaborator": false
//!     }
//! }"#;
//!
//! let response: AccessTokenResponse = serde_json::from_str(json).unwrap();
//! assert_eq!(response.user_id(), Some(902_541_635));
//! ```

use serde::{Deserialize, Serialize};

/// The Shopify user who authorized an online access token.
///
/// Field names follow the `associated_user` object of Shopify's token
/// response. Missing flags default to `false` and missing strings to empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedUser {
    /// The Shopify user ID.
    pub id: u64,

    /// The user's first name.
    #[serde(default)]
    pub first_name: String,

    /// The user's last name.
    #[serde(default)]
    pub last_name: String,

    /// The user's email address.
    #[serde(default)]
    pub email: String,

    /// Whether the user's email has been verified.
    #[serde(default)]
    pub email_verified: bool,

    /// Whether the user owns the shop.
    #[serde(default)]
    pub account_owner: bool,

    /// The user's locale preference (e.g., "en", "fr").
    #[serde(default)]
    pub locale: String,

    /// Whether the user is a collaborator account.
    #[serde(default)]
    pub collaborator: bool,
}

impl AssociatedUser {
    /// Creates a user with only an ID set.
    #[must_use]
    pub fn with_id(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Returns "first last", trimmed of missing parts.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Result of exchanging credentials for an access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    /// The access token used to authenticate API calls.
    pub access_token: String,

    /// Comma-separated scopes granted to the app.
    #[serde(default)]
    pub scope: String,

    /// Comma-separated scopes granted to the user (online tokens only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_user_scope: Option<String>,

    /// The authorizing user (online tokens only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_user: Option<AssociatedUser>,
}

impl AccessTokenResponse {
    /// Creates an offline token response.
    #[must_use]
    pub fn offline(access_token: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            scope: scope.into(),
            associated_user_scope: None,
            associated_user: None,
        }
    }

    /// Creates an online token response for `user`.
    #[must_use]
    pub fn online(
        access_token: impl Into<String>,
        scope: impl Into<String>,
        user: AssociatedUser,
    ) -> Self {
        Self {
            associated_user: Some(user),
            ..Self::offline(access_token, scope)
        }
    }

    /// Returns the authorizing user's ID, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<u64> {
        self.associated_user.as_ref().map(|user| user.id)
    }
}

// Verify exchange types are Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<AssociatedUser>();
    assert_send_sync::<AccessTokenResponse>();
};
