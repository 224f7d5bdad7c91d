//! Authentication types for the Shopify API pipeline.
//!
//! # Overview
//!
//! - [`AuthScopes`]: A set of OAuth scopes with implied scope handling
//! - [`AccessTokenResponse`] and [`AssociatedUser`]: The result of a
//!   credential exchange, consumed when creating sessions
//! - [`TokenVerifier`] and [`JwtTokenVerifier`]: Verification of App Bridge
//!   session tokens
//!
//! # Session Types
//!
//! Shopify issues two kinds of access tokens:
//!
//! - **Offline tokens**: App-level tokens that don't expire. Used for
//!   background work and webhooks.
//! - **Online tokens**: Tied to the user who authorized the app, carry an
//!   [`AssociatedUser`], and expire.

mod access_token;
mod scopes;
mod token;

pub use access_token::{AccessTokenResponse, AssociatedUser};
pub use scopes::AuthScopes;
pub use token::{JwtTokenVerifier, TokenClaims, TokenVerifier};
