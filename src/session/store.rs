//! The session storage seam.

use std::fmt;

use async_trait::async_trait;

use crate::session::{Session, SessionError};

/// Keyed storage for [`Session`]s.
///
/// Every operation is atomic with respect to the table: readers observe
/// either a whole previously stored session or none. Lookups that filter on
/// validity ([`load`](Self::load), [`find_by_shop`](Self::find_by_shop),
/// [`find_active`](Self::find_active), [`exists`](Self::exists),
/// [`count_by_shop`](Self::count_by_shop)) never return expired sessions.
///
/// Shop arguments are normalized with
/// [`normalize_shop_domain`](crate::normalize_shop_domain) before matching.
///
/// [`InMemorySessionStore`](crate::session::InMemorySessionStore) is the
/// bundled implementation; durable backends implement this trait.
#[async_trait]
pub trait SessionStore: Send + Sync + fmt::Debug {
    /// Inserts or replaces a session.
    ///
    /// An empty `id` is derived from the shop and user. `updated_at` is set
    /// to the store's current time. Returns the session as stored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StoreCapacityExceeded`] when inserting a new
    /// ID into a full store that stays full after removing expired sessions.
    async fn store(&self, session: Session) -> Result<Session, SessionError>;

    /// Loads a valid session.
    ///
    /// An expired session found under `id` is removed.
    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError>;

    /// Removes a session. Returns whether one was removed.
    async fn delete(&self, id: &str) -> Result<bool, SessionError>;

    /// Removes every session of `shop`. Returns how many were removed.
    async fn delete_by_shop(&self, shop: &str) -> Result<usize, SessionError>;

    /// Returns the valid sessions of `shop`.
    async fn find_by_shop(&self, shop: &str) -> Result<Vec<Session>, SessionError>;

    /// Returns every valid session.
    async fn find_active(&self) -> Result<Vec<Session>, SessionError>;

    /// Removes every expired session. Returns how many were removed.
    async fn delete_expired(&self) -> Result<usize, SessionError>;

    /// Whether a valid session is stored under `id`.
    async fn exists(&self, id: &str) -> Result<bool, SessionError> {
        Ok(self.load(id).await?.is_some())
    }

    /// Replaces an existing session and sets its `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSession`] if nothing is stored under
    /// the session's ID.
    async fn update(&self, session: Session) -> Result<Session, SessionError>;

    /// Number of stored sessions, including expired ones not yet removed.
    async fn count(&self) -> Result<usize, SessionError>;

    /// Number of valid sessions of `shop`.
    async fn count_by_shop(&self, shop: &str) -> Result<usize, SessionError> {
        Ok(self.find_by_shop(shop).await?.len())
    }
}
