//! Redis-backed key-value store.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::info;

use super::KvStore;
use crate::{Error, Result};

/// KV store over a shared Redis instance.
///
/// `ConnectionManager` multiplexes and reconnects internally; clones are
/// cheap, so each operation works on its own handle.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisKvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisKvStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisKvStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::cache(format!("Failed to create Redis client: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::cache(format!("Failed to connect to Redis: {e}")))?;

        info!("Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| Error::cache(format!("Redis GET failed: {e}")))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
            .map_err(|e| Error::cache(format!("Redis SETEX failed: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Error::cache(format!("Redis DEL failed: {e}")))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.incr(key, delta)
            .await
            .map_err(|e| Error::cache(format!("Redis INCRBY failed: {e}")))
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.decr(key, delta)
            .await
            .map_err(|e| Error::cache(format!("Redis DECRBY failed: {e}")))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| Error::cache(format!("Redis EXPIRE failed: {e}")))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| Error::cache(format!("Redis SADD failed: {e}")))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member)
            .await
            .map_err(|e| Error::cache(format!("Redis SREM failed: {e}")))
    }

    async fn set_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        conn.scard(key)
            .await
            .map_err(|e| Error::cache(format!("Redis SCARD failed: {e}")))
    }
}
