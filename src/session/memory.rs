//! In-memory session storage with a background expiry sweep.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::clock::{SharedClock, SystemClock};
use crate::config::{normalize_shop_domain, SessionStoreConfig};
use crate::error::ConfigError;
use crate::session::{Session, SessionError, SessionStore};

/// A bounded, concurrent, in-memory [`SessionStore`].
///
/// Sessions live in a sharded map keyed by ID. The store holds at most
/// `max_sessions` entries; inserting a new ID into a full store first
/// removes expired sessions and fails with
/// [`SessionError::StoreCapacityExceeded`] if that frees nothing.
///
/// Stores created with [`spawn`](Self::spawn) also run a periodic sweep on
/// the tokio runtime. The sweep stops on [`shutdown`](Self::shutdown) or
/// when the store is dropped.
///
/// # Example
///
/// ```rust,ignore
/// use shopify_pipeline::clock::SystemClock;
/// use shopify_pipeline::session::{InMemorySessionStore, SessionStore};
/// use shopify_pipeline::SessionStoreConfig;
///
/// let store = InMemorySessionStore::spawn(SessionStoreConfig::default(), SystemClock::shared())?;
/// store.store(session).await?;
///
/// // On application shutdown
/// store.shutdown().await;
/// ```
#[derive(Debug)]
pub struct InMemorySessionStore {
    table: Arc<SessionTable>,
    config: SessionStoreConfig,
    sweeper: Mutex<Option<Sweeper>>,
}

#[derive(Debug)]
struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// The map plus an occupancy counter that never exceeds `max_sessions`.
#[derive(Debug)]
struct SessionTable {
    sessions: DashMap<String, Session>,
    occupied: AtomicUsize,
    max_sessions: usize,
    clock: SharedClock,
}

impl SessionTable {
    /// Claims a slot for a new entry, failing if the table is full.
    fn reserve_slot(&self) -> bool {
        self.occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |occupied| {
                (occupied < self.max_sessions).then_some(occupied + 1)
            })
            .is_ok()
    }

    fn release_slot(&self) {
        self.occupied.fetch_sub(1, Ordering::AcqRel);
    }

    fn insert(&self, session: Session) -> Result<Session, SessionError> {
        if let Some(mut existing) = self.sessions.get_mut(&session.id) {
            *existing = session.clone();
            return Ok(session);
        }

        if !self.reserve_slot() {
            let removed = self.remove_expired();
            if !self.reserve_slot() {
                tracing::warn!(
                    max_sessions = self.max_sessions,
                    expired_removed = removed,
                    "Session store is full"
                );
                return Err(SessionError::StoreCapacityExceeded {
                    max_sessions: self.max_sessions,
                });
            }
        }

        match self.sessions.entry(session.id.clone()) {
            // Inserted concurrently under the same ID; replace without a new slot
            Entry::Occupied(mut entry) => {
                entry.insert(session.clone());
                self.release_slot();
            }
            Entry::Vacant(entry) => {
                entry.insert(session.clone());
            }
        }
        Ok(session)
    }

    fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            self.release_slot();
        }
        removed
    }

    fn remove_if_expired(&self, id: &str) -> bool {
        let now = self.clock.now();
        let removed = self
            .sessions
            .remove_if(id, |_, session| session.is_expired_at(now))
            .is_some();
        if removed {
            self.release_slot();
        }
        removed
    }

    /// Collects matching IDs first so no map guard is held while removing.
    fn ids_where(&self, predicate: impl Fn(&Session) -> bool) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn remove_expired(&self) -> usize {
        let now = self.clock.now();
        let removed = self
            .ids_where(|session| session.is_expired_at(now))
            .iter()
            .filter(|id| self.remove_if_expired(id))
            .count();
        if removed > 0 {
            tracing::debug!(removed, remaining = self.sessions.len(), "Removed expired sessions");
        }
        removed
    }

    fn valid_where(&self, predicate: impl Fn(&Session) -> bool) -> Vec<Session> {
        let now = self.clock.now();
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_valid_at(now) && predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl InMemorySessionStore {
    /// Creates a store without a background sweep.
    ///
    /// Expired sessions are still removed lazily on load and whenever the
    /// store is full.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSessionStore`] if `config` is invalid.
    pub fn new(config: SessionStoreConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            table: Arc::new(SessionTable {
                sessions: DashMap::new(),
                occupied: AtomicUsize::new(0),
                max_sessions: config.max_sessions,
                clock,
            }),
            config,
            sweeper: Mutex::new(None),
        })
    }

    /// Creates a store with default settings, real time and no sweep.
    ///
    /// # Errors
    ///
    /// Never fails with the default settings; the `Result` mirrors [`new`](Self::new).
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(SessionStoreConfig::default(), SystemClock::shared())
    }

    /// Creates a store and starts its periodic expiry sweep.
    ///
    /// Must be called from within a tokio runtime. The first sweep runs one
    /// `sweep_interval` after creation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSessionStore`] if `config` is invalid.
    pub fn spawn(config: SessionStoreConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        let store = Self::new(config, clock)?;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sweep_periodically(
            Arc::clone(&store.table),
            config,
            cancel.clone(),
        ));
        *store.sweeper.lock() = Some(Sweeper { cancel, handle });

        tracing::info!(
            max_sessions = config.max_sessions,
            sweep_interval_secs = config.sweep_interval.as_secs(),
            "Session store started with periodic expiry sweep"
        );
        Ok(store)
    }

    /// Returns the store settings.
    #[must_use]
    pub const fn config(&self) -> &SessionStoreConfig {
        &self.config
    }

    /// Whether the background sweep is running.
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|sweeper| !sweeper.handle.is_finished())
    }

    /// Stops the background sweep.
    ///
    /// Waits up to `shutdown_timeout` for an in-progress sweep to finish,
    /// then aborts the task. Stored sessions are kept.
    pub async fn shutdown(&self) {
        let Some(Sweeper { cancel, mut handle }) = self.sweeper.lock().take() else {
            return;
        };
        cancel.cancel();

        if tokio::time::timeout(self.config.shutdown_timeout, &mut handle)
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_ms = self.config.shutdown_timeout.as_millis(),
                "Session sweep did not stop in time; aborting"
            );
            handle.abort();
        }
        tracing::info!("Session store sweep stopped");
    }

    /// Returns every stored session, expired ones included.
    #[must_use]
    pub fn all_sessions(&self) -> Vec<Session> {
        self.table
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Removes every session.
    pub fn clear(&self) {
        let ids = self.table.ids_where(|_| true);
        for id in &ids {
            self.table.remove(id);
        }
        tracing::debug!(removed = ids.len(), "Cleared session store");
    }
}

impl Drop for InMemorySessionStore {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.cancel.cancel();
        }
    }
}

async fn sweep_periodically(
    table: Arc<SessionTable>,
    config: SessionStoreConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match panic::catch_unwind(AssertUnwindSafe(|| table.remove_expired())) {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(
                        removed,
                        remaining = table.sessions.len(),
                        "Swept expired sessions"
                    ),
                    Err(_) => tracing::error!("Session expiry sweep panicked; will retry next interval"),
                }
            }
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn store(&self, mut session: Session) -> Result<Session, SessionError> {
        if session.id.is_empty() {
            session.id = session.derived_id();
        }
        session.updated_at = self.table.clock.now();

        let stored = self.table.insert(session)?;
        tracing::debug!(
            session_id = %stored.id,
            total = self.table.sessions.len(),
            "Stored session"
        );
        Ok(stored)
    }

    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let now = self.table.clock.now();
        let found = self.table.sessions.get(id).map(|entry| entry.value().clone());

        match found {
            Some(session) if session.is_valid_at(now) => Ok(Some(session)),
            Some(session) if session.is_expired_at(now) => {
                if self.table.remove_if_expired(id) {
                    tracing::debug!(session_id = id, "Removed expired session on load");
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, SessionError> {
        let removed = self.table.remove(id);
        if removed {
            tracing::debug!(session_id = id, "Deleted session");
        }
        Ok(removed)
    }

    async fn delete_by_shop(&self, shop: &str) -> Result<usize, SessionError> {
        let shop = normalize_shop_domain(shop);
        let removed = self
            .table
            .ids_where(|session| normalize_shop_domain(&session.shop) == shop)
            .iter()
            .filter(|id| self.table.remove(id))
            .count();
        tracing::debug!(shop = %shop, removed, "Deleted sessions for shop");
        Ok(removed)
    }

    async fn find_by_shop(&self, shop: &str) -> Result<Vec<Session>, SessionError> {
        let shop = normalize_shop_domain(shop);
        Ok(self
            .table
            .valid_where(|session| normalize_shop_domain(&session.shop) == shop))
    }

    async fn find_active(&self) -> Result<Vec<Session>, SessionError> {
        Ok(self.table.valid_where(|_| true))
    }

    async fn delete_expired(&self) -> Result<usize, SessionError> {
        Ok(self.table.remove_expired())
    }

    async fn update(&self, mut session: Session) -> Result<Session, SessionError> {
        let Some(mut existing) = self.table.sessions.get_mut(&session.id) else {
            tracing::warn!(session_id = %session.id, "Attempted to update unknown session");
            return Err(SessionError::UnknownSession { id: session.id });
        };
        session.updated_at = self.table.clock.now();
        *existing = session.clone();
        drop(existing);

        tracing::debug!(session_id = %session.id, "Updated session");
        Ok(session)
    }

    async fn count(&self) -> Result<usize, SessionError> {
        Ok(self.table.sessions.len())
    }
}

// Verify InMemorySessionStore is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<InMemorySessionStore>();
};
