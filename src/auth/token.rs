//! Session token verification.
//!
//! Embedded apps receive a session token (JWT) from App Bridge on every
//! request. [`SessionManager::create_session_from_token`](crate::session::SessionManager::create_session_from_token)
//! verifies it through the [`TokenVerifier`] trait and derives the shop, user
//! and expiry of the new session from the resulting [`TokenClaims`].
//!
//! # JWT Structure
//!
//! Shopify session tokens contain the following claims:
//!
//! - `iss`: Issuer (e.g., `https://shop.myshopify.com/admin`)
//! - `dest`: Destination shop (e.g., `https://shop.myshopify.com`)
//! - `aud`: Audience (the app's API key)
//! - `sub`: Subject (user ID for admin tokens, optional)
//! - `exp`, `nbf`, `iat`: Expiry, not-before and issued-at timestamps
//! - `jti`: Unique token identifier
//! - `sid`: Shopify session ID (optional)
//!
//! # Dual-Key Validation
//!
//! To support API secret rotation, [`JwtTokenVerifier`] first tries the
//! primary secret and falls back to the old secret if one is configured.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::config::{normalize_shop_domain, ApiKey, ApiSecretKey, PipelineConfig};
use crate::session::SessionError;

/// Leeway for time-based claims (10 seconds).
const JWT_LEEWAY_SECS: u64 = 10;

/// Claims extracted from a verified session token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenClaims {
    /// The normalized shop the token was issued for.
    pub shop: String,
    /// The Shopify user ID, present only for admin tokens.
    pub user_id: Option<u64>,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

/// Verifies session tokens.
///
/// Implementations must be cheap to call concurrently.
pub trait TokenVerifier: Send + Sync + fmt::Debug {
    /// Verifies `token` and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidToken`] if the token is malformed,
    /// badly signed, expired, or addressed to another app.
    fn verify(&self, token: &str) -> Result<TokenClaims, SessionError>;
}

/// Raw App Bridge session token payload.
#[derive(Debug, Deserialize)]
struct SessionTokenPayload {
    iss: String,
    dest: String,
    aud: String,
    sub: Option<String>,
    exp: i64,
}

impl SessionTokenPayload {
    /// Returns the user ID when `iss` ends with `/admin` and `sub` is numeric.
    fn user_id(&self) -> Option<u64> {
        if !self.iss.ends_with("/admin") {
            return None;
        }
        self.sub
            .as_deref()
            .filter(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_ascii_digit()))
            .and_then(|sub| sub.parse().ok())
    }
}

/// HS256 verifier for Shopify App Bridge session tokens.
///
/// # Example
///
/// ```rust
/// use shopify_pipeline::{ApiKey, ApiSecretKey};
/// use shopify_pipeline::auth::{JwtTokenVerifier, TokenVerifier};
///
/// let verifier = JwtTokenVerifier::new(
///     ApiKey::new("api-key").unwrap(),
///     ApiSecretKey::new("secret").unwrap(),
///     None,
/// );
///
/// assert!(verifier.verify("not-a-jwt").is_err());
/// ```
#[derive(Clone, Debug)]
pub struct JwtTokenVerifier {
    api_key: ApiKey,
    secret: ApiSecretKey,
    old_secret: Option<ApiSecretKey>,
}

impl JwtTokenVerifier {
    /// Creates a verifier for tokens addressed to `api_key`.
    #[must_use]
    pub const fn new(api_key: ApiKey, secret: ApiSecretKey, old_secret: Option<ApiSecretKey>) -> Self {
        Self {
            api_key,
            secret,
            old_secret,
        }
    }

    /// Creates a verifier from the credentials in `config`.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.api_key().clone(),
            config.api_secret_key().clone(),
            config.old_api_secret_key().cloned(),
        )
    }

    fn decode_with_key(
        token: &str,
        secret: &ApiSecretKey,
    ) -> Result<SessionTokenPayload, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = JWT_LEEWAY_SECS;
        validation.validate_nbf = true;
        // Audience is compared against the API key after decoding
        validation.validate_aud = false;

        let key = DecodingKey::from_secret(secret.as_ref().as_bytes());
        decode::<SessionTokenPayload>(token, &key, &validation).map(|data| data.claims)
    }
}

impl TokenVerifier for JwtTokenVerifier {
    fn verify(&self, token: &str) -> Result<TokenClaims, SessionError> {
        let payload = match Self::decode_with_key(token, &self.secret) {
            Ok(payload) => payload,
            Err(primary_err) => self
                .old_secret
                .as_ref()
                .and_then(|old| Self::decode_with_key(token, old).ok())
                .ok_or_else(|| SessionError::InvalidToken {
                    reason: format!("Error decoding session token: {primary_err}"),
                })?,
        };

        if payload.aud != self.api_key.as_ref() {
            tracing::warn!(aud = %payload.aud, "Session token addressed to another app");
            return Err(SessionError::InvalidToken {
                reason: "Session token had invalid API key".to_string(),
            });
        }

        let expires_at = Utc
            .timestamp_opt(payload.exp, 0)
            .single()
            .ok_or_else(|| SessionError::InvalidToken {
                reason: format!("Session token has out-of-range expiry {}", payload.exp),
            })?;

        Ok(TokenClaims {
            shop: normalize_shop_domain(&payload.dest),
            user_id: payload.user_id(),
            expires_at,
        })
    }
}

// Verify verifier is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<JwtTokenVerifier>();
};
