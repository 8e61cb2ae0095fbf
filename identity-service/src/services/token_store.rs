//! Refresh-token material and the shared fast store behind it.
//!
//! A refresh credential is an opaque pair: a UUIDv4 `rid` used as the lookup
//! key and a high-entropy secret whose sha256 is what gets stored. The store
//! also holds the per-user token-version counters that back global
//! invalidation. One-time consumption is a server-side Lua script so that
//! concurrent presenters of the same pair see exactly one winner.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use once_cell::sync::Lazy;
use rand::RngCore;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use regex::Regex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::services::ServiceError;

pub const KEY_PREFIX_REFRESH: &str = "auth:refresh:";
pub const KEY_PREFIX_TOKENVER: &str = "auth:tokenver:";

/// Separator between rid and secret in the packed external token.
const REFRESH_SEPARATOR: char = '.';

const MAX_REFRESH_TOKEN_LEN: usize = 4096;
const MAX_RID_LEN: usize = 64;
const MAX_SECRET_LEN: usize = 256;

/// Random bytes per minted secret, base64url-encoded before use.
const SECRET_BYTES: usize = 48;

static RE_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid regex")
});
static RE_SAFE_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._~-]+$").expect("secret regex"));

/// GET the entry, compare the stored hash against the presented one, and
/// delete the key — as a single indivisible operation on the Redis side.
static CONSUME_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local v = redis.call('GET', KEYS[1])
if not v then
  return nil
end
local user_id, token_ver, secret_hash = string.match(v, '^(%d+)|(%d+)|(.+)$')
if not user_id then
  return nil
end
if secret_hash ~= ARGV[1] then
  return nil
end
redis.call('DEL', KEYS[1])
return {user_id, token_ver}
"#,
    )
});

/// Opaque refresh credential. The raw secret only ever lives in the client's
/// hands and in this struct between mint and pack; the store keeps its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenPair {
    pub rid: String,
    pub secret: String,
}

impl RefreshTokenPair {
    /// Mint a fresh pair. Never reuses material.
    pub fn mint() -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            rid: Uuid::new_v4().to_string(),
            secret: URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    /// Serialize for the client: `{rid}.{secret}`.
    pub fn pack(&self) -> String {
        format!("{}{}{}", self.rid, REFRESH_SEPARATOR, self.secret)
    }

    /// Strict parse of a client-supplied token. Any deviation from the
    /// canonical shape fails as `RefreshTokenInvalid`; nothing partially
    /// parses.
    pub fn unpack(token: &str) -> Result<Self, ServiceError> {
        if token.is_empty() || token.len() > MAX_REFRESH_TOKEN_LEN {
            return Err(ServiceError::RefreshTokenInvalid);
        }
        let (rid, secret) = token
            .split_once(REFRESH_SEPARATOR)
            .ok_or(ServiceError::RefreshTokenInvalid)?;
        let rid = rid.trim();
        let secret = secret.trim();

        if rid.is_empty() || secret.is_empty() {
            return Err(ServiceError::RefreshTokenInvalid);
        }
        if rid.len() > MAX_RID_LEN || secret.len() > MAX_SECRET_LEN {
            return Err(ServiceError::RefreshTokenInvalid);
        }
        if !RE_UUID.is_match(rid) || !RE_SAFE_SEGMENT.is_match(secret) {
            return Err(ServiceError::RefreshTokenInvalid);
        }

        Ok(Self {
            rid: rid.to_string(),
            secret: secret.to_string(),
        })
    }

    pub fn secret_hash(&self) -> String {
        sha256_hex(&self.secret)
    }
}

fn sha256_hex(s: &str) -> String {
    hex::encode(Sha256::digest(s.as_bytes()))
}

fn refresh_key(rid: &str) -> String {
    format!("{KEY_PREFIX_REFRESH}{rid}")
}

fn tokenver_key(user_id: i64) -> String {
    format!("{KEY_PREFIX_TOKENVER}{user_id}")
}

/// A consumed refresh entry: the identity it was stored for and the token
/// version that was live when it was minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumedRefresh {
    pub user_id: i64,
    pub token_version: i64,
}

/// Shared fast store for refresh entries and token-version counters.
///
/// Errors from this trait are infrastructure failures ("store unreachable"),
/// never domain outcomes; "token not found / mismatched" is the `Ok(None)`
/// return of `consume_refresh`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current token version for a user; 0 when the counter is absent.
    async fn token_version(&self, user_id: i64) -> Result<i64, anyhow::Error>;

    /// Atomically increment the user's token version, invalidating every
    /// previously issued access token.
    async fn bump_token_version(&self, user_id: i64) -> Result<i64, anyhow::Error>;

    /// Persist a refresh entry with a TTL. The raw secret is not stored.
    async fn store_refresh(
        &self,
        pair: &RefreshTokenPair,
        user_id: i64,
        token_version: i64,
        ttl: Duration,
    ) -> Result<(), anyhow::Error>;

    /// Validate and consume in one indivisible step. Exactly one of any set
    /// of concurrent callers presenting the same valid pair gets `Some`.
    async fn consume_refresh(
        &self,
        pair: &RefreshTokenPair,
    ) -> Result<Option<ConsumedRefresh>, anyhow::Error>;

    /// Unconditional delete; idempotent.
    async fn revoke_refresh(&self, rid: &str) -> Result<(), anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisTokenStore {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisTokenStore {
    pub async fn new(config: &RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        let connect = client.get_connection_manager();
        let manager = tokio::time::timeout(Duration::from_secs(config.connect_timeout_seconds), connect)
            .await
            .map_err(|_| anyhow::anyhow!("Redis connect timed out"))?
            .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {e}"))?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            manager,
            op_timeout: Duration::from_secs(config.op_timeout_seconds),
        })
    }

    /// Bound every store call so a wedged Redis cannot stall request tasks.
    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, anyhow::Error> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| anyhow::anyhow!("Redis operation timed out"))?
            .map_err(|e| anyhow::anyhow!("Redis error: {e}"))
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn token_version(&self, user_id: i64) -> Result<i64, anyhow::Error> {
        let mut conn = self.manager.clone();
        let v: Option<String> = self
            .bounded(
                redis::cmd("GET")
                    .arg(tokenver_key(user_id))
                    .query_async(&mut conn),
            )
            .await?;
        Ok(v.and_then(|s| s.parse::<i64>().ok()).unwrap_or(0))
    }

    async fn bump_token_version(&self, user_id: i64) -> Result<i64, anyhow::Error> {
        let mut conn = self.manager.clone();
        self.bounded(
            redis::cmd("INCR")
                .arg(tokenver_key(user_id))
                .query_async(&mut conn),
        )
        .await
    }

    async fn store_refresh(
        &self,
        pair: &RefreshTokenPair,
        user_id: i64,
        token_version: i64,
        ttl: Duration,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let value = format!("{user_id}|{token_version}|{}", pair.secret_hash());
        // SET with EX is one command: there is no window where the entry
        // exists without a lifetime bound.
        self.bounded(
            redis::cmd("SET")
                .arg(refresh_key(&pair.rid))
                .arg(value)
                .arg("EX")
                .arg(ttl.as_secs())
                .query_async::<_, ()>(&mut conn),
        )
        .await
    }

    async fn consume_refresh(
        &self,
        pair: &RefreshTokenPair,
    ) -> Result<Option<ConsumedRefresh>, anyhow::Error> {
        let mut conn = self.manager.clone();
        let res: Option<(String, String)> = self
            .bounded(
                CONSUME_SCRIPT
                    .key(refresh_key(&pair.rid))
                    .arg(pair.secret_hash())
                    .invoke_async(&mut conn),
            )
            .await?;

        let Some((user_id, token_version)) = res else {
            return Ok(None);
        };
        match (user_id.parse::<i64>(), token_version.parse::<i64>()) {
            (Ok(user_id), Ok(token_version)) => Ok(Some(ConsumedRefresh {
                user_id,
                token_version,
            })),
            _ => {
                tracing::warn!(rid = %pair.rid, "malformed refresh entry consumed");
                Ok(None)
            }
        }
    }

    async fn revoke_refresh(&self, rid: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        self.bounded(
            redis::cmd("DEL")
                .arg(refresh_key(rid))
                .query_async::<_, ()>(&mut conn),
        )
        .await
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        self.bounded(redis::cmd("PING").query_async::<_, ()>(&mut conn))
            .await
    }
}

/// In-process store with the same atomicity guarantees, used by tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
    versions: Mutex<HashMap<i64, i64>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn token_version(&self, user_id: i64) -> Result<i64, anyhow::Error> {
        Ok(self
            .versions
            .lock()
            .map_err(|e| anyhow::anyhow!("version map mutex poisoned: {e}"))?
            .get(&user_id)
            .copied()
            .unwrap_or(0))
    }

    async fn bump_token_version(&self, user_id: i64) -> Result<i64, anyhow::Error> {
        let mut versions = self
            .versions
            .lock()
            .map_err(|e| anyhow::anyhow!("version map mutex poisoned: {e}"))?;
        let v = versions.entry(user_id).or_insert(0);
        *v += 1;
        Ok(*v)
    }

    async fn store_refresh(
        &self,
        pair: &RefreshTokenPair,
        user_id: i64,
        token_version: i64,
        _ttl: Duration,
    ) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("entry map mutex poisoned: {e}"))?
            .insert(
                refresh_key(&pair.rid),
                format!("{user_id}|{token_version}|{}", pair.secret_hash()),
            );
        Ok(())
    }

    async fn consume_refresh(
        &self,
        pair: &RefreshTokenPair,
    ) -> Result<Option<ConsumedRefresh>, anyhow::Error> {
        // Lock held across check-and-delete: same exactly-once contract as
        // the Redis script.
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("entry map mutex poisoned: {e}"))?;

        let key = refresh_key(&pair.rid);
        let Some(value) = entries.get(&key) else {
            return Ok(None);
        };
        let mut parts = value.splitn(3, '|');
        let (Some(uid), Some(ver), Some(hash)) = (parts.next(), parts.next(), parts.next()) else {
            return Ok(None);
        };
        if hash != pair.secret_hash() {
            return Ok(None);
        }
        let (Ok(user_id), Ok(token_version)) = (uid.parse::<i64>(), ver.parse::<i64>()) else {
            return Ok(None);
        };
        entries.remove(&key);
        Ok(Some(ConsumedRefresh {
            user_id,
            token_version,
        }))
    }

    async fn revoke_refresh(&self, rid: &str) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("entry map mutex poisoned: {e}"))?
            .remove(&refresh_key(rid));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_produces_valid_pack() {
        let pair = RefreshTokenPair::mint();
        let packed = pair.pack();
        let unpacked = RefreshTokenPair::unpack(&packed).unwrap();
        assert_eq!(unpacked, pair);
    }

    #[test]
    fn test_mint_never_repeats() {
        let a = RefreshTokenPair::mint();
        let b = RefreshTokenPair::mint();
        assert_ne!(a.rid, b.rid);
        assert_ne!(a.secret, b.secret);
    }

    #[test]
    fn test_unpack_rejects_malformed() {
        let rid = Uuid::new_v4().to_string();
        for bad in [
            String::new(),
            "no-separator".to_string(),
            format!("{rid}."),
            format!(".{}", "s".repeat(10)),
            format!("not-a-uuid.{}", "s".repeat(10)),
            format!("{rid}.has space"),
            format!("{rid}.bad/chars"),
            format!("{rid}.{}", "s".repeat(300)),
            "x".repeat(5000),
        ] {
            assert!(
                matches!(
                    RefreshTokenPair::unpack(&bad),
                    Err(ServiceError::RefreshTokenInvalid)
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_secret_hash_is_stable() {
        let pair = RefreshTokenPair::mint();
        assert_eq!(pair.secret_hash(), pair.secret_hash());
        assert_eq!(pair.secret_hash().len(), 64);
    }

    #[tokio::test]
    async fn test_memory_store_consume_once() {
        let store = MemoryTokenStore::new();
        let pair = RefreshTokenPair::mint();
        store
            .store_refresh(&pair, 7, 2, Duration::from_secs(60))
            .await
            .unwrap();

        let first = store.consume_refresh(&pair).await.unwrap();
        assert_eq!(
            first,
            Some(ConsumedRefresh {
                user_id: 7,
                token_version: 2
            })
        );

        let second = store.consume_refresh(&pair).await.unwrap();
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_memory_store_rejects_wrong_secret_without_consuming() {
        let store = MemoryTokenStore::new();
        let pair = RefreshTokenPair::mint();
        store
            .store_refresh(&pair, 7, 2, Duration::from_secs(60))
            .await
            .unwrap();

        let forged = RefreshTokenPair {
            rid: pair.rid.clone(),
            secret: "wrong-secret".to_string(),
        };
        assert_eq!(store.consume_refresh(&forged).await.unwrap(), None);

        // The genuine pair is still there.
        assert!(store.consume_refresh(&pair).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = MemoryTokenStore::new();
        let pair = RefreshTokenPair::mint();
        store
            .store_refresh(&pair, 1, 0, Duration::from_secs(60))
            .await
            .unwrap();

        store.revoke_refresh(&pair.rid).await.unwrap();
        store.revoke_refresh(&pair.rid).await.unwrap();
        assert_eq!(store.consume_refresh(&pair).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_version_defaults_to_zero_and_increments() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.token_version(9).await.unwrap(), 0);
        assert_eq!(store.bump_token_version(9).await.unwrap(), 1);
        assert_eq!(store.bump_token_version(9).await.unwrap(), 2);
        assert_eq!(store.token_version(9).await.unwrap(), 2);
    }
}
