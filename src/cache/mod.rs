//! Shared key-value store.
//!
//! The resource ledger and the live-status cache both live in a low-latency
//! KV tier. All mutations go through atomic store primitives (INCR/DECR,
//! set add/remove) so concurrent dispatchers never read-modify-write.

pub mod keys;
pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

pub use self::memory::MemoryKvStore;
pub use self::redis::RedisKvStore;

/// Atomic key-value operations used by the ledger and the live-status cache.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Set a value and (re)arm its TTL.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Atomically add `delta` to an integer key, returning the new value.
    /// A missing key counts as zero. The key's TTL is left untouched.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;
    /// Atomically subtract `delta` from an integer key, returning the new value.
    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64>;
    /// (Re)arm the TTL of an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;
    async fn set_add(&self, key: &str, member: &str) -> Result<()>;
    async fn set_remove(&self, key: &str, member: &str) -> Result<()>;
    async fn set_len(&self, key: &str) -> Result<u64>;
}
