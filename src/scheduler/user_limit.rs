//! Per-user resource quotas.
//!
//! Each user carries two windowed counters in the KV store: threads in use
//! and jobs started. The window is TTL-based; when the keys expire the
//! user's quota resets.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{KvStore, keys};
use crate::config::UserResourceLimitConfig;
use crate::Result;

/// A user's current quota consumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserUsage {
    pub threads_in_use: i64,
    pub jobs_started_in_window: i64,
}

/// Maintains the per-user quota counters.
pub struct UserResourceLimiter {
    kv: Arc<dyn KvStore>,
    config: UserResourceLimitConfig,
}

impl UserResourceLimiter {
    pub fn new(kv: Arc<dyn KvStore>, config: UserResourceLimitConfig) -> Self {
        Self { kv, config }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.time_window_secs)
    }

    /// Read a user's current usage. Missing keys read as zero.
    pub async fn usage(&self, user_id: &str) -> Result<UserUsage> {
        let threads_in_use = self
            .read_counter(&keys::user_threads(user_id))
            .await?;
        let jobs_started_in_window = self.read_counter(&keys::user_jobs(user_id)).await?;
        Ok(UserUsage {
            threads_in_use,
            jobs_started_in_window,
        })
    }

    async fn read_counter(&self, key: &str) -> Result<i64> {
        let value = match self.kv.get(key).await? {
            Some(raw) => raw.parse::<i64>().unwrap_or_else(|_| {
                warn!("Invalid counter value under {key}: {raw}");
                0
            }),
            None => 0,
        };
        Ok(value.max(0))
    }

    /// Charge a dispatched job against its user: thread credit plus one job
    /// slot, both with the window TTL re-armed.
    pub async fn record_start(&self, user_id: Option<&str>, threads: u32) -> Result<()> {
        let Some(user_id) = user_id else {
            return Ok(());
        };

        let thread_key = keys::user_threads(user_id);
        self.kv.incr_by(&thread_key, threads as i64).await?;
        self.kv.expire(&thread_key, self.window()).await?;

        let job_key = keys::user_jobs(user_id);
        self.kv.incr_by(&job_key, 1).await?;
        self.kv.expire(&job_key, self.window()).await?;

        debug!(user_id, threads, "Recorded user resource usage");
        Ok(())
    }

    /// Return a completed job's thread credit. The job counter is never
    /// decremented; it only resets with the window.
    pub async fn release(&self, user_id: Option<&str>, threads: u32) -> Result<()> {
        let Some(user_id) = user_id else {
            return Ok(());
        };

        let thread_key = keys::user_threads(user_id);
        let remaining = self.kv.decr_by(&thread_key, threads as i64).await?;
        if remaining < 0 {
            warn!(
                user_id,
                remaining, "User thread counter went negative; clamping to zero"
            );
            self.kv.set_with_ttl(&thread_key, "0", self.window()).await?;
        }

        debug!(user_id, threads, "Released user resources");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKvStore;

    fn limiter() -> UserResourceLimiter {
        UserResourceLimiter::new(
            Arc::new(MemoryKvStore::new()),
            UserResourceLimitConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_usage_starts_at_zero() {
        let usage = limiter().usage("u1").await.unwrap();
        assert_eq!(usage, UserUsage::default());
    }

    #[tokio::test]
    async fn test_record_and_release() {
        let limiter = limiter();
        limiter.record_start(Some("u1"), 3).await.unwrap();
        limiter.record_start(Some("u1"), 2).await.unwrap();

        let usage = limiter.usage("u1").await.unwrap();
        assert_eq!(usage.threads_in_use, 5);
        assert_eq!(usage.jobs_started_in_window, 2);

        limiter.release(Some("u1"), 3).await.unwrap();
        let usage = limiter.usage("u1").await.unwrap();
        assert_eq!(usage.threads_in_use, 2);
        // Job count only resets with the window.
        assert_eq!(usage.jobs_started_in_window, 2);
    }

    #[tokio::test]
    async fn test_release_clamps_at_zero() {
        let limiter = limiter();
        limiter.record_start(Some("u1"), 1).await.unwrap();
        limiter.release(Some("u1"), 5).await.unwrap();

        let usage = limiter.usage("u1").await.unwrap();
        assert_eq!(usage.threads_in_use, 0);
    }

    #[tokio::test]
    async fn test_anonymous_user_untracked() {
        let limiter = limiter();
        limiter.record_start(None, 5).await.unwrap();
        limiter.release(None, 5).await.unwrap();
    }

    #[tokio::test]
    async fn test_window_expiry_resets_quota() {
        let limiter = UserResourceLimiter::new(
            Arc::new(MemoryKvStore::new()),
            UserResourceLimitConfig {
                time_window_secs: 0,
                ..UserResourceLimitConfig::default()
            },
        );
        limiter.record_start(Some("u1"), 5).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let usage = limiter.usage("u1").await.unwrap();
        assert_eq!(usage, UserUsage::default());
    }
}
