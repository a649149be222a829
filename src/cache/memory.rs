//! In-process key-value store.
//!
//! Single-node deployments and tests use this instead of Redis. TTLs are
//! enforced lazily: an expired entry is dropped the next time its key is
//! touched.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::KvStore;
use crate::{Error, Result};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Process-local KV store with the same atomicity guarantees as the Redis
/// backend (every operation holds the map lock).
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
        f(&mut entries)
    }

    fn counter_value(entry: Option<&Entry>) -> Result<i64> {
        match entry {
            None => Ok(0),
            Some(Entry {
                value: Value::Str(raw),
                ..
            }) => raw
                .parse()
                .map_err(|_| Error::cache(format!("non-integer counter value '{raw}'"))),
            Some(_) => Err(Error::cache("counter key holds a set")),
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| match entries.get(key) {
            Some(Entry {
                value: Value::Str(raw),
                ..
            }) => Ok(Some(raw.clone())),
            Some(_) => Err(Error::cache("string key holds a set")),
            None => Ok(None),
        })
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Str(value.to_string()),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.remove(key);
        });
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.with_entries(|entries| {
            let next = Self::counter_value(entries.get(key))? + delta;
            let expires_at = entries.get(key).and_then(|e| e.expires_at);
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Str(next.to_string()),
                    expires_at,
                },
            );
            Ok(next)
        })
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.incr_by(key, -delta).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(Instant::now() + ttl);
            }
        });
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Set(HashSet::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Set(members) => {
                    members.insert(member.to_string());
                    Ok(())
                }
                Value::Str(_) => Err(Error::cache("set key holds a string")),
            }
        })
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        self.with_entries(|entries| {
            if let Some(Entry {
                value: Value::Set(members),
                ..
            }) = entries.get_mut(key)
            {
                members.remove(member);
            }
            Ok(())
        })
    }

    async fn set_len(&self, key: &str) -> Result<u64> {
        self.with_entries(|entries| match entries.get(key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.len() as u64),
            Some(_) => Err(Error::cache("set key holds a string")),
            None => Ok(0),
        })
    }
}
