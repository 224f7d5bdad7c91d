//! Session storage and lifecycle.
//!
//! # Overview
//!
//! - [`Session`]: One shop's (or one shop user's) access token and grants
//! - [`SessionStore`]: The storage seam, implemented by
//!   [`InMemorySessionStore`] and by durable backends
//! - [`SessionManager`]: Creation from credential exchanges or session
//!   tokens, lookup, validation and cleanup
//! - [`SessionError`]: Why a session could not be created, found or used
//!
//! # Session IDs
//!
//! IDs are derived from the normalized shop name: `offline_{shop}` for
//! offline sessions and `online_{shop}_{user_id}` for online ones, so every
//! shop has at most one offline session and one online session per user.
//!
//! # Expiry
//!
//! Online sessions expire. Expired sessions are never returned by lookups;
//! they are removed lazily when loaded, when the store is full, and by the
//! periodic sweep of a spawned [`InMemorySessionStore`].

mod errors;
mod manager;
mod memory;
mod model;
mod store;

pub use errors::SessionError;
pub use manager::{SessionManager, SessionStats};
pub use memory::InMemorySessionStore;
pub use model::Session;
pub use store::SessionStore;
