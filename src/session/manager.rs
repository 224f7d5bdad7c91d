//! Session lifecycle rules layered over a [`SessionStore`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::{AccessTokenResponse, AuthScopes, TokenVerifier};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{normalize_shop_domain, ShopDomain, DEFAULT_ONLINE_SESSION_TTL};
use crate::session::{Session, SessionError, SessionStore};

/// Session counts reported by [`SessionManager::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Sessions stored after the sweep.
    pub total: usize,
    /// Stored sessions that are currently valid.
    pub active: usize,
    /// Expired sessions removed while gathering the stats.
    pub expired: usize,
}

/// Creates, looks up and validates sessions.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use shopify_pipeline::auth::{AccessTokenResponse, JwtTokenVerifier};
/// use shopify_pipeline::session::{InMemorySessionStore, SessionManager};
///
/// let manager = SessionManager::new(
///     Arc::new(InMemorySessionStore::with_defaults()?),
///     Arc::new(JwtTokenVerifier::from_config(&config)),
/// );
///
/// let response = AccessTokenResponse::offline("shpat_abc", "read_products");
/// let session = manager.create_session("my-store.myshopify.com", &response, false).await?;
/// assert_eq!(session.id, "offline_my-store");
///
/// let session = manager.validate_session("offline_my-store").await?;
/// manager.validate_scopes(&session, &"read_products".parse()?)?;
/// ```
#[derive(Debug, Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    verifier: Arc<dyn TokenVerifier>,
    clock: SharedClock,
    online_session_ttl: Duration,
}

impl SessionManager {
    /// Creates a manager with real time and a 24 hour online session lifetime.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            store,
            verifier,
            clock: SystemClock::shared(),
            online_session_ttl: DEFAULT_ONLINE_SESSION_TTL,
        }
    }

    /// Uses `clock` for creation stamps, expiry and validity checks.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the lifetime given to online sessions built from token responses.
    #[must_use]
    pub const fn with_online_session_ttl(mut self, ttl: Duration) -> Self {
        self.online_session_ttl = ttl;
        self
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Creates and stores a session from a credential exchange result.
    ///
    /// Online sessions take their user from the response and expire after
    /// the configured online session lifetime.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidShop`] if `shop` is not a valid shop domain
    /// - [`SessionError::MissingAssociatedUser`] if `is_online` is set but
    ///   the response has no associated user
    /// - Any error of [`SessionStore::store`]
    pub async fn create_session(
        &self,
        shop: &str,
        response: &AccessTokenResponse,
        is_online: bool,
    ) -> Result<Session, SessionError> {
        let normalized = valid_shop(shop)?;
        let scopes: AuthScopes = response.scope.split(',').collect();
        let now = self.clock.now();

        let session = if is_online {
            let user = response
                .associated_user
                .clone()
                .ok_or_else(|| SessionError::MissingAssociatedUser {
                    shop: normalized.to_string(),
                })?;
            Session::online(
                normalized.as_ref(),
                user.id,
                response.access_token.clone(),
                scopes,
                now,
                expiry_after(now, self.online_session_ttl),
            )
            .with_associated_user(user)
        } else {
            Session::offline(normalized.as_ref(), response.access_token.clone(), scopes, now)
        };

        let stored = self.store.store(session).await?;
        tracing::info!(
            session_id = %stored.id,
            shop = %stored.shop,
            online = stored.is_online,
            "Created session"
        );
        Ok(stored)
    }

    /// Creates and stores a session from a verified session token.
    ///
    /// The shop, user and expiry come from the token claims. The session is
    /// online exactly when the token names a user.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidToken`] if verification fails
    /// - [`SessionError::InvalidShop`] if the token's shop is not a valid shop domain
    /// - Any error of [`SessionStore::store`]
    pub async fn create_session_from_token(
        &self,
        token: &str,
        access_token: &str,
    ) -> Result<Session, SessionError> {
        let claims = self.verifier.verify(token)?;
        let shop = valid_shop(&claims.shop)?;

        let now = self.clock.now();
        let session = match claims.user_id {
            Some(user_id) => Session::online(
                shop.as_ref(),
                user_id,
                access_token,
                AuthScopes::new(),
                now,
                claims.expires_at,
            ),
            None => Session::offline(shop.as_ref(), access_token, AuthScopes::new(), now),
        };

        let stored = self.store.store(session).await?;
        tracing::info!(session_id = %stored.id, shop = %stored.shop, "Created session from token");
        Ok(stored)
    }

    /// Returns the session if it exists and is valid.
    ///
    /// # Errors
    ///
    /// Returns errors raised by the store.
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let now = self.clock.now();
        Ok(self
            .store
            .load(id)
            .await?
            .filter(|session| session.is_valid_at(now)))
    }

    /// Returns the valid session of `shop`, online for `user_id` or offline.
    ///
    /// # Errors
    ///
    /// Returns errors raised by the store.
    pub async fn get_for_shop(
        &self,
        shop: &str,
        is_online: bool,
        user_id: Option<u64>,
    ) -> Result<Option<Session>, SessionError> {
        self.get_session(&Session::session_id(shop, is_online, user_id))
            .await
    }

    /// Returns the valid offline session of `shop`.
    ///
    /// # Errors
    ///
    /// Returns errors raised by the store.
    pub async fn get_offline_session(&self, shop: &str) -> Result<Option<Session>, SessionError> {
        self.get_for_shop(shop, false, None).await
    }

    /// Returns the valid sessions of `shop`.
    ///
    /// # Errors
    ///
    /// Returns errors raised by the store.
    pub async fn sessions_for_shop(&self, shop: &str) -> Result<Vec<Session>, SessionError> {
        self.store.find_by_shop(shop).await
    }

    /// Returns the session, failing if it is missing or no longer valid.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidSession`] if no valid session exists.
    pub async fn validate_session(&self, id: &str) -> Result<Session, SessionError> {
        self.get_session(id)
            .await?
            .ok_or_else(|| SessionError::InvalidSession { id: id.to_string() })
    }

    /// Checks that `session` was granted every scope in `required`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InsufficientScopes`] listing the missing scopes.
    pub fn validate_scopes(
        &self,
        session: &Session,
        required: &AuthScopes,
    ) -> Result<(), SessionError> {
        let missing = session.scopes.missing(required);
        if missing.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            session_id = %session.id,
            missing = %missing.join(","),
            "Session lacks required scopes"
        );
        Err(SessionError::InsufficientScopes {
            id: session.id.clone(),
            missing: missing.into_iter().map(str::to_string).collect(),
        })
    }

    /// Marks a valid session as used now.
    ///
    /// Returns the touched session, or `None` if no valid session exists.
    ///
    /// # Errors
    ///
    /// Returns errors raised by the store.
    pub async fn touch_session(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let Some(mut session) = self.get_session(id).await? else {
            return Ok(None);
        };
        session.touch(self.clock.now());
        self.store.update(session).await.map(Some)
    }

    /// Replaces a stored session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSession`] if it is not stored.
    pub async fn update_session(&self, session: Session) -> Result<Session, SessionError> {
        self.store.update(session).await
    }

    /// Deletes a session. Returns whether one was removed.
    ///
    /// # Errors
    ///
    /// Returns errors raised by the store.
    pub async fn delete_session(&self, id: &str) -> Result<bool, SessionError> {
        self.store.delete(id).await
    }

    /// Deletes every session of `shop`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns errors raised by the store.
    pub async fn delete_sessions_for_shop(&self, shop: &str) -> Result<usize, SessionError> {
        let removed = self.store.delete_by_shop(shop).await?;
        tracing::info!(shop = %normalize_shop_domain(shop), removed, "Deleted sessions for shop");
        Ok(removed)
    }

    /// Removes every expired session. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns errors raised by the store.
    pub async fn cleanup_expired(&self) -> Result<usize, SessionError> {
        let removed = self.store.delete_expired().await?;
        if removed > 0 {
            tracing::info!(removed, "Cleaned up expired sessions");
        }
        Ok(removed)
    }

    /// Sweeps expired sessions, then counts what remains.
    ///
    /// # Errors
    ///
    /// Returns errors raised by the store.
    pub async fn stats(&self) -> Result<SessionStats, SessionError> {
        let expired = self.store.delete_expired().await?;
        let total = self.store.count().await?;
        let active = self.store.find_active().await?.len();
        Ok(SessionStats {
            total,
            active,
            expired,
        })
    }
}

fn valid_shop(shop: &str) -> Result<ShopDomain, SessionError> {
    ShopDomain::new(shop).map_err(|_| SessionError::InvalidShop {
        shop: shop.to_string(),
    })
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// Verify SessionManager is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SessionManager>();
};
