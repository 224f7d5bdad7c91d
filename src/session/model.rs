//! The session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::{AssociatedUser, AuthScopes};
use crate::config::normalize_shop_domain;

/// An authenticated session for Shopify API calls.
///
/// Sessions hold the access token used on behalf of a shop. They are either
/// offline (app-level, never expire) or online (tied to the user who
/// authorized the app, expire at `expires_at`).
///
/// Session IDs are derived from the shop and user:
/// `offline_{shop}` or `online_{shop}_{user_id}`.
///
/// Time-dependent checks take the current time as an argument so callers can
/// evaluate them against any [`Clock`](crate::clock::Clock).
///
/// # Example
///
/// ```rust
/// use chrono::{Duration, Utc};
/// use shopify_pipeline::session::Session;
///
/// let now = Utc::now();
/// let session = Session::online(
///     "https://My-Store.myshopify.com",
///     42,
///     "shpua_token",
///     "read_products".parse().unwrap(),
///     now,
///     now + Duration::hours(24),
/// );
///
/// assert_eq!(session.id, "online_my-store_42");
/// assert!(session.is_valid_at(now));
/// assert!(session.is_expired_at(now + Duration::hours(25)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session.
    pub id: String,

    /// The normalized shop name.
    pub shop: String,

    /// The access token for API authentication.
    pub access_token: String,

    /// The OAuth scopes granted to this session.
    pub scopes: AuthScopes,

    /// Whether this is an online (user-specific) session.
    pub is_online: bool,

    /// The Shopify user ID, present only for online sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,

    /// Details of the authorizing user, when the token response carried them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_user: Option<AssociatedUser>,

    /// When the session was first created.
    pub created_at: DateTime<Utc>,

    /// When the session was last stored, touched or updated.
    pub updated_at: DateTime<Utc>,

    /// When an online session expires. Offline sessions never do.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Application-defined values attached to the session.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Session {
    /// Creates an offline session for `shop`.
    #[must_use]
    pub fn offline(
        shop: &str,
        access_token: impl Into<String>,
        scopes: AuthScopes,
        now: DateTime<Utc>,
    ) -> Self {
        let shop = normalize_shop_domain(shop);
        Self {
            id: Self::session_id(&shop, false, None),
            shop,
            access_token: access_token.into(),
            scopes,
            is_online: false,
            user_id: None,
            associated_user: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
            metadata: Map::new(),
        }
    }

    /// Creates an online session for `user_id` on `shop`, expiring at `expires_at`.
    #[must_use]
    pub fn online(
        shop: &str,
        user_id: u64,
        access_token: impl Into<String>,
        scopes: AuthScopes,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let offline = Self::offline(shop, access_token, scopes, now);
        Self {
            id: Self::session_id(&offline.shop, true, Some(user_id)),
            is_online: true,
            user_id: Some(user_id),
            expires_at: Some(expires_at),
            ..offline
        }
    }

    /// Derives the session ID for a shop and optional user.
    ///
    /// The shop is normalized first. An online lookup without a user ID
    /// falls back to the offline ID.
    ///
    /// # Example
    ///
    /// ```rust
    /// use shopify_pipeline::session::Session;
    ///
    /// assert_eq!(Session::session_id("MY-STORE.myshopify.com", false, None), "offline_my-store");
    /// assert_eq!(Session::session_id("my-store", true, Some(7)), "online_my-store_7");
    /// ```
    #[must_use]
    pub fn session_id(shop: &str, is_online: bool, user_id: Option<u64>) -> String {
        let shop = normalize_shop_domain(shop);
        match (is_online, user_id) {
            (true, Some(user_id)) => format!("online_{shop}_{user_id}"),
            _ => format!("offline_{shop}"),
        }
    }

    /// Returns the ID this session's fields derive to.
    #[must_use]
    pub fn derived_id(&self) -> String {
        Self::session_id(&self.shop, self.is_online, self.user_id)
    }

    /// Attaches the authorizing user's details.
    #[must_use]
    pub fn with_associated_user(mut self, user: AssociatedUser) -> Self {
        self.associated_user = Some(user);
        self
    }

    /// Whether the session has passed its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Whether the session can be used at `now`.
    ///
    /// A usable session has an access token, a shop, and has not expired.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.trim().is_empty()
            && !self.shop.trim().is_empty()
            && !self.is_expired_at(now)
    }

    /// Whole seconds until expiry at `now`, or `None` for sessions that never expire.
    ///
    /// Negative once the session has expired.
    #[must_use]
    pub fn seconds_until_expiration(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at
            .map(|expires_at| (expires_at - now).num_seconds())
    }

    /// Returns `"online"` or `"offline"`.
    #[must_use]
    pub const fn session_type(&self) -> &'static str {
        if self.is_online {
            "online"
        } else {
            "offline"
        }
    }

    /// Whether every scope in `required` was granted.
    #[must_use]
    pub fn has_scopes(&self, required: &AuthScopes) -> bool {
        self.scopes.covers(required)
    }

    /// Marks the session as used at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Returns the metadata value stored under `key`.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Stores a metadata value and marks the session as updated at `now`.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value, now: DateTime<Utc>) {
        self.metadata.insert(key.into(), value);
        self.touch(now);
    }
}

// Verify Session is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Session>();
};
