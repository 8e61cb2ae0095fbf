//! Token lifecycle tests against the in-process store: one-time refresh
//! consumption, the concurrent-consume race, and version-based invalidation.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use identity_service::config::JwtConfig;
use identity_service::services::{
    AuditTrail, AuthService, JwtService, MemoryTokenStore, RefreshTokenPair, ServiceError,
    TokenStore,
};

const TTL: Duration = Duration::from_secs(3600);

fn jwt_service() -> JwtService {
    JwtService::new(&JwtConfig {
        secret: "test-secret-test-secret-test-secret".to_string(),
        issuer: "identity-service".to_string(),
        access_token_expiry_minutes: 30,
        refresh_token_expiry_days: 14,
        leeway_seconds: 0,
    })
}

#[tokio::test]
async fn test_refresh_token_consumed_exactly_once() {
    let store = MemoryTokenStore::new();
    let pair = RefreshTokenPair::mint();
    store.store_refresh(&pair, 7, 3, TTL).await.unwrap();

    let first = store.consume_refresh(&pair).await.unwrap();
    let consumed = first.expect("first consume should succeed");
    assert_eq!(consumed.user_id, 7);
    assert_eq!(consumed.token_version, 3);

    let second = store.consume_refresh(&pair).await.unwrap();
    assert!(second.is_none(), "second consume must find nothing");
}

#[tokio::test]
async fn test_concurrent_consumes_have_one_winner() {
    let store = Arc::new(MemoryTokenStore::new());
    let pair = RefreshTokenPair::mint();
    store.store_refresh(&pair, 1, 1, TTL).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        let pair = pair.clone();
        handles.push(tokio::spawn(async move {
            store.consume_refresh(&pair).await.unwrap()
        }));
    }

    let results = futures::future::join_all(handles).await;
    let winners = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| r.is_some())
        .count();
    assert_eq!(winners, 1, "exactly one concurrent consume may win");
}

#[tokio::test]
async fn test_wrong_secret_does_not_consume() {
    let store = MemoryTokenStore::new();
    let pair = RefreshTokenPair::mint();
    store.store_refresh(&pair, 9, 0, TTL).await.unwrap();

    let forged = RefreshTokenPair {
        rid: pair.rid.clone(),
        secret: RefreshTokenPair::mint().secret,
    };
    assert!(store.consume_refresh(&forged).await.unwrap().is_none());

    // The real pair is still intact after the failed attempt.
    assert!(store.consume_refresh(&pair).await.unwrap().is_some());
}

#[tokio::test]
async fn test_version_bump_orphans_old_access_tokens() {
    let store = MemoryTokenStore::new();
    let jwt = jwt_service();

    let version = store.bump_token_version(42).await.unwrap();
    let token = jwt.create_access_token(42, version).unwrap();

    // Logout (or another login) bumps the counter.
    store.bump_token_version(42).await.unwrap();

    let payload = jwt.decode_access_token(&token).unwrap();
    let live = store.token_version(42).await.unwrap();
    assert_ne!(
        payload.token_version, live,
        "token minted before the bump must no longer match"
    );
}

#[tokio::test]
async fn test_refresh_of_superseded_pair_is_expired() {
    // A lazily-connected pool: the stale-version and consumed-pair paths
    // both return before any database access.
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy("postgres://localhost:1/unreachable")
        .unwrap();
    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let auth = AuthService::new(pool, store.clone(), jwt_service(), 14);
    let trail = AuditTrail::detached();

    let version = store.bump_token_version(5).await.unwrap();
    let pair = RefreshTokenPair::mint();
    store.store_refresh(&pair, 5, version, TTL).await.unwrap();

    // A later login bumps the counter and supersedes the pair.
    store.bump_token_version(5).await.unwrap();

    let err = auth.refresh(&pair.pack(), &trail).await.unwrap_err();
    assert!(matches!(err, ServiceError::RefreshTokenExpired));

    // The failed attempt still consumed the pair, so a replay finds nothing.
    let err = auth.refresh(&pair.pack(), &trail).await.unwrap_err();
    assert!(matches!(err, ServiceError::RefreshTokenInvalid));
}

#[tokio::test]
async fn test_rotation_retires_the_presented_pair() {
    let store = MemoryTokenStore::new();

    let old = RefreshTokenPair::mint();
    store.store_refresh(&old, 5, 2, TTL).await.unwrap();

    // Simulate the refresh operation: consume, then mint at the same version.
    let consumed = store.consume_refresh(&old).await.unwrap().unwrap();
    let new = RefreshTokenPair::mint();
    store
        .store_refresh(&new, consumed.user_id, consumed.token_version, TTL)
        .await
        .unwrap();

    assert!(store.consume_refresh(&old).await.unwrap().is_none());
    let again = store.consume_refresh(&new).await.unwrap().unwrap();
    assert_eq!(again.token_version, 2);
}

#[tokio::test]
async fn test_revoke_then_consume_finds_nothing() {
    let store = MemoryTokenStore::new();
    let pair = RefreshTokenPair::mint();
    store.store_refresh(&pair, 3, 0, TTL).await.unwrap();

    store.revoke_refresh(&pair.rid).await.unwrap();
    assert!(store.consume_refresh(&pair).await.unwrap().is_none());

    // Revoking again is a no-op, not an error.
    store.revoke_refresh(&pair.rid).await.unwrap();
}

#[tokio::test]
async fn test_packed_token_round_trip_consumes() {
    let store = MemoryTokenStore::new();
    let pair = RefreshTokenPair::mint();
    store.store_refresh(&pair, 11, 4, TTL).await.unwrap();

    // The wire form is what clients echo back.
    let packed = pair.pack();
    let unpacked = RefreshTokenPair::unpack(&packed).unwrap();
    let consumed = store.consume_refresh(&unpacked).await.unwrap().unwrap();
    assert_eq!(consumed.user_id, 11);
    assert_eq!(consumed.token_version, 4);
}
