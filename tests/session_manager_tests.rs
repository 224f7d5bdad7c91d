//! Integration tests for the session manager.
//!
//! Session tokens are real HS256 JWTs signed with the test secret and
//! verified by `JwtTokenVerifier`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use shopify_pipeline::auth::{AccessTokenResponse, AssociatedUser, JwtTokenVerifier};
use shopify_pipeline::clock::{Clock, ManualClock};
use shopify_pipeline::session::{InMemorySessionStore, SessionError, SessionManager, SessionStore};
use shopify_pipeline::{ApiKey, ApiSecretKey, SessionStoreConfig};

const API_KEY: &str = "test-api-key";
const SECRET: &str = "test-secret";

#[derive(Serialize)]
struct SessionTokenClaims {
    iss: String,
    dest: String,
    aud: String,
    sub: Option<String>,
    exp: i64,
    nbf: i64,
    iat: i64,
    jti: String,
}

/// Signs an App Bridge session token for `shop`, valid for five minutes.
fn session_token(shop: &str, user_id: Option<u64>) -> String {
    let now = Utc::now().timestamp();
    let claims = SessionTokenClaims {
        iss: format!("https://{shop}.myshopify.com/admin"),
        dest: format!("https://{shop}.myshopify.com"),
        aud: API_KEY.to_string(),
        sub: user_id.map(|id| id.to_string()),
        exp: now + 300,
        nbf: now - 10,
        iat: now,
        jti: "test-jti".to_string(),
    };
    let key = EncodingKey::from_secret(SECRET.as_bytes());
    encode(&Header::new(Algorithm::HS256), &claims, &key).unwrap()
}

/// Creates a manager over an in-memory store on a manual clock.
fn manager() -> (Arc<ManualClock>, Arc<InMemorySessionStore>, SessionManager) {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemorySessionStore::new(SessionStoreConfig::default(), clock.clone()).unwrap());
    let verifier = JwtTokenVerifier::new(
        ApiKey::new(API_KEY).unwrap(),
        ApiSecretKey::new(SECRET).unwrap(),
        None,
    );
    let manager = SessionManager::new(store.clone(), Arc::new(verifier))
        .with_clock(clock.clone())
        .with_online_session_ttl(Duration::from_secs(60 * 60));
    (clock, store, manager)
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_offline_session_from_token_exchange() {
    let (_, _, manager) = manager();
    let response = AccessTokenResponse::offline("shpat_abc", "read_products,write_orders");

    let session = manager
        .create_session("https://My-Store.myshopify.com", &response, false)
        .await
        .unwrap();

    assert_eq!(session.id, "offline_my-store");
    assert_eq!(session.shop, "my-store");
    assert!(!session.is_online);
    assert!(session.expires_at.is_none());
    assert!(session.scopes.contains("read_orders"));
}

#[tokio::test]
async fn test_online_session_expires_after_ttl() {
    let (clock, _, manager) = manager();
    let user = AssociatedUser::with_id(902_541_635);
    let response = AccessTokenResponse::online("shpua_abc", "read_products", user);

    let session = manager.create_session("my-store", &response, true).await.unwrap();

    assert_eq!(session.id, "online_my-store_902541635");
    assert_eq!(session.associated_user.as_ref().map(|u| u.id), Some(902_541_635));
    assert_eq!(session.seconds_until_expiration(clock.now()), Some(3600));

    clock.advance(Duration::from_secs(3601));
    assert!(manager.get_session(&session.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_online_session_requires_associated_user() {
    let (_, _, manager) = manager();
    let response = AccessTokenResponse::offline("shpua_abc", "read_products");

    let err = manager.create_session("my-store", &response, true).await.unwrap_err();

    assert_eq!(
        err,
        SessionError::MissingAssociatedUser {
            shop: "my-store".to_string()
        }
    );
}

#[tokio::test]
async fn test_blank_shop_is_rejected() {
    let (_, _, manager) = manager();
    let response = AccessTokenResponse::offline("shpat_abc", "read_products");

    let err = manager.create_session("  ", &response, false).await.unwrap_err();

    assert!(matches!(err, SessionError::InvalidShop { .. }));
}

#[tokio::test]
async fn test_session_from_admin_token_is_online() {
    let (clock, _, manager) = manager();
    let token = session_token("token-shop", Some(12345));

    let session = manager
        .create_session_from_token(&token, "shpua_from_exchange")
        .await
        .unwrap();

    assert_eq!(session.id, "online_token-shop_12345");
    assert_eq!(session.access_token, "shpua_from_exchange");

    clock.advance(Duration::from_secs(10 * 60));
    let err = manager.validate_session(&session.id).await.unwrap_err();
    assert_eq!(
        err,
        SessionError::InvalidSession {
            id: "online_token-shop_12345".to_string()
        }
    );
}

#[tokio::test]
async fn test_session_from_token_without_user_is_offline() {
    let (_, _, manager) = manager();
    let token = session_token("token-shop", None);

    let session = manager
        .create_session_from_token(&token, "shpat_from_exchange")
        .await
        .unwrap();

    assert_eq!(session.id, "offline_token-shop");
    assert!(!session.is_online);
}

#[tokio::test]
async fn test_tampered_token_is_rejected() {
    let (_, store, manager) = manager();
    let mut token = session_token("token-shop", Some(1));
    token.push('x');

    let err = manager
        .create_session_from_token(&token, "shpua_abc")
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::InvalidToken { .. }));
    assert_eq!(store.count().await.unwrap(), 0);
}

// ============================================================================
// Lookup and Validation
// ============================================================================

#[tokio::test]
async fn test_get_for_shop_finds_online_and_offline() {
    let (_, _, manager) = manager();
    manager
        .create_session("my-store", &AccessTokenResponse::offline("shpat", "read_products"), false)
        .await
        .unwrap();
    manager
        .create_session(
            "my-store",
            &AccessTokenResponse::online("shpua", "read_products", AssociatedUser::with_id(7)),
            true,
        )
        .await
        .unwrap();

    let offline = manager.get_offline_session("MY-STORE.myshopify.com").await.unwrap();
    let online = manager.get_for_shop("my-store", true, Some(7)).await.unwrap();
    let fallback = manager.get_for_shop("my-store", true, None).await.unwrap();

    assert_eq!(offline.unwrap().access_token, "shpat");
    assert_eq!(online.unwrap().access_token, "shpua");
    assert_eq!(fallback.unwrap().id, "offline_my-store");
    assert_eq!(manager.sessions_for_shop("my-store").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_validate_scopes_lists_missing_scopes() {
    let (_, _, manager) = manager();
    let session = manager
        .create_session("my-store", &AccessTokenResponse::offline("shpat", "write_products"), false)
        .await
        .unwrap();

    manager
        .validate_scopes(&session, &"read_products".parse().unwrap())
        .unwrap();

    let err = manager
        .validate_scopes(&session, &"write_products,write_orders,read_customers".parse().unwrap())
        .unwrap_err();
    match err {
        SessionError::InsufficientScopes { id, missing } => {
            assert_eq!(id, "offline_my-store");
            assert!(missing.contains(&"write_orders".to_string()));
            assert!(missing.contains(&"read_customers".to_string()));
            assert!(!missing.contains(&"write_products".to_string()));
        }
        other => panic!("Expected InsufficientScopes, got: {other:?}"),
    }
}

// ============================================================================
// Maintenance
// ============================================================================

#[tokio::test]
async fn test_touch_session_updates_timestamp() {
    let (clock, _, manager) = manager();
    let session = manager
        .create_session("my-store", &AccessTokenResponse::offline("shpat", "read_products"), false)
        .await
        .unwrap();

    clock.advance(Duration::from_secs(90));
    let touched = manager.touch_session(&session.id).await.unwrap().unwrap();

    assert_eq!(touched.updated_at, clock.now());
    assert_eq!(touched.created_at, session.created_at);
    assert!(manager.touch_session("offline_missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_sessions_for_shop() {
    let (_, _, manager) = manager();
    for user_id in [1, 2] {
        manager
            .create_session(
                "my-store",
                &AccessTokenResponse::online("shpua", "read_products", AssociatedUser::with_id(user_id)),
                true,
            )
            .await
            .unwrap();
    }
    manager
        .create_session("other", &AccessTokenResponse::offline("shpat", "read_products"), false)
        .await
        .unwrap();

    assert_eq!(manager.delete_sessions_for_shop("my-store.myshopify.com").await.unwrap(), 2);
    assert!(manager.delete_session("offline_other").await.unwrap());
    assert_eq!(manager.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_stats_sweep_expired_sessions() {
    let (clock, _, manager) = manager();
    manager
        .create_session("my-store", &AccessTokenResponse::offline("shpat", "read_products"), false)
        .await
        .unwrap();
    manager
        .create_session(
            "my-store",
            &AccessTokenResponse::online("shpua", "read_products", AssociatedUser::with_id(3)),
            true,
        )
        .await
        .unwrap();

    clock.advance(Duration::from_secs(2 * 60 * 60));
    let stats = manager.stats().await.unwrap();

    assert_eq!(stats.expired, 1);
    assert_eq!(stats.total, 1);
    assert_eq!(stats.active, 1);
    assert_eq!(manager.cleanup_expired().await.unwrap(), 0);
}
