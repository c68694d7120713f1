//! Token store protocol: the authoritative registry of live refresh tokens
//! and the access-token blacklist.
//!
//! Tokens are signed artifacts that cannot be edited after issuance, so every
//! revocation decision rides on this store. The Redis implementation keeps two
//! keys per live refresh token, written and deleted inside single Lua scripts
//! so they can never diverge:
//!
//! - `rt:device:{user}:{device}` -> jti (at most one live jti per pair, I1)
//! - `rt:jti:{jti}` -> `{user}:{device}` (membership index for liveness checks)
//!
//! Blacklist entries live under `bl:{jti}` with a TTL equal to the remaining
//! token lifetime, so the denylist never outgrows the tokens it blocks.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Registry of live refresh tokens and blacklisted jtis.
///
/// `put_refresh_token` and `rotate_refresh_token` must be atomic: no
/// interleaving may leave two live jtis for one (user, device) pair.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Register `jti` as the live refresh token for (user, device),
    /// superseding any previously stored jti in the same atomic step.
    async fn put_refresh_token(
        &self,
        jti: Uuid,
        user_id: Uuid,
        device_id: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Compare-and-swap rotation: replace `current_jti` with `new_jti` only
    /// if `current_jti` is still the live one. Returns `false` when the
    /// presented token was already superseded or revoked, so two racing
    /// rotations of the same token yield exactly one success.
    async fn rotate_refresh_token(
        &self,
        user_id: Uuid,
        device_id: &str,
        current_jti: Uuid,
        new_jti: Uuid,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Membership check by jti alone.
    async fn refresh_token_exists(&self, jti: Uuid) -> Result<bool, StoreError>;

    /// Drop the live refresh token for one device. Idempotent.
    async fn remove_refresh_token(&self, user_id: Uuid, device_id: &str)
        -> Result<(), StoreError>;

    /// Drop the live refresh tokens for every device of a user, without
    /// advance knowledge of the device set. Idempotent.
    async fn remove_all_refresh_tokens(&self, user_id: Uuid) -> Result<(), StoreError>;

    /// Blacklist a jti for `ttl`; the entry self-expires when the token
    /// would have expired anyway.
    async fn blacklist_token(&self, jti: Uuid, ttl: Duration) -> Result<(), StoreError>;

    async fn is_blacklisted(&self, jti: Uuid) -> Result<bool, StoreError>;
}

// Lua keeps the device key and the jti index in lockstep; each script is one
// atomic unit on the server.
const PUT_SCRIPT: &str = r"
local old = redis.call('GET', KEYS[1])
if old then
    redis.call('DEL', 'rt:jti:'..old)
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
redis.call('SET', 'rt:jti:'..ARGV[1], ARGV[3], 'EX', ARGV[2])
return 1
";

const ROTATE_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if current ~= ARGV[1] then
    return 0
end
redis.call('DEL', 'rt:jti:'..current)
redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
redis.call('SET', 'rt:jti:'..ARGV[2], ARGV[4], 'EX', ARGV[3])
return 1
";

const REMOVE_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if current then
    redis.call('DEL', 'rt:jti:'..current)
    redis.call('DEL', KEYS[1])
end
return 1
";

/// Redis-backed token store shared by all server instances.
#[derive(Clone)]
pub struct RedisTokenStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisTokenStore {
    /// Connect to the store; fails fast when the address is unreachable so
    /// the server never starts without revocation state.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;

        Ok(Self { conn })
    }
}

fn device_key(user_id: Uuid, device_id: &str) -> String {
    format!("rt:device:{user_id}:{device_id}")
}

fn jti_key(jti: Uuid) -> String {
    format!("rt:jti:{jti}")
}

fn blacklist_key(jti: Uuid) -> String {
    format!("bl:{jti}")
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn put_refresh_token(
        &self,
        jti: Uuid,
        user_id: Uuid,
        device_id: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::Script::new(PUT_SCRIPT)
            .key(device_key(user_id, device_id))
            .arg(jti.to_string())
            .arg(ttl_seconds(ttl))
            .arg(format!("{user_id}:{device_id}"))
            .invoke_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        user_id: Uuid,
        device_id: &str,
        current_jti: Uuid,
        new_jti: Uuid,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let rotated: i64 = redis::Script::new(ROTATE_SCRIPT)
            .key(device_key(user_id, device_id))
            .arg(current_jti.to_string())
            .arg(new_jti.to_string())
            .arg(ttl_seconds(ttl))
            .arg(format!("{user_id}:{device_id}"))
            .invoke_async(&mut conn)
            .await?;

        Ok(rotated == 1)
    }

    async fn refresh_token_exists(&self, jti: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(jti_key(jti)).await?;

        Ok(exists)
    }

    async fn remove_refresh_token(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::Script::new(REMOVE_SCRIPT)
            .key(device_key(user_id, device_id))
            .invoke_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn remove_all_refresh_tokens(&self, user_id: Uuid) -> Result<(), StoreError> {
        // The store indexes live tokens by user prefix; collect first so the
        // connection is free for the deletes.
        let mut scan_conn = self.conn.clone();
        let pattern = format!("rt:device:{user_id}:*");
        let keys: Vec<String> = {
            let mut iter: redis::AsyncIter<'_, String> = scan_conn.scan_match(pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut conn = self.conn.clone();
        for key in keys {
            let _: i64 = redis::Script::new(REMOVE_SCRIPT)
                .key(key)
                .invoke_async(&mut conn)
                .await?;
        }

        Ok(())
    }

    async fn blacklist_token(&self, jti: Uuid, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(blacklist_key(jti), 1u8, ttl_seconds(ttl))
            .await?;

        Ok(())
    }

    async fn is_blacklisted(&self, jti: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(blacklist_key(jti)).await?;

        Ok(exists)
    }
}
