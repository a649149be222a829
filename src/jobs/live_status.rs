//! Live status cache.
//!
//! Progress for in-flight jobs is too hot to round-trip through the durable
//! store, so the execution driver writes full snapshots into the KV tier.
//! Every write re-arms a one-hour TTL: if a worker dies silently, the
//! status read falls back to the durable row once the key expires.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{KvStore, keys};
use crate::database::models::JobStatus;
use crate::Result;

/// TTL for live-status entries.
const LIVE_STATUS_TTL: Duration = Duration::from_secs(3600);

/// Full progress snapshot for one in-flight job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatus {
    pub status: JobStatus,
    pub message: String,
    pub urls_submitted: i64,
    pub urls_succeeded: i64,
    pub urls_failed: i64,
}

impl LiveStatus {
    pub fn running(
        message: impl Into<String>,
        urls_submitted: i64,
        urls_succeeded: i64,
        urls_failed: i64,
    ) -> Self {
        Self {
            status: JobStatus::Running,
            message: message.into(),
            urls_submitted,
            urls_succeeded,
            urls_failed,
        }
    }
}

/// Write-through channel from the execution driver to the status read path.
pub struct LiveStatusCache {
    kv: Arc<dyn KvStore>,
}

impl LiveStatusCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Store the snapshot and re-arm its TTL.
    pub async fn write(&self, job_id: &str, status: &LiveStatus) -> Result<()> {
        let payload = serde_json::to_string(status)?;
        self.kv
            .set_with_ttl(&keys::live_status(job_id), &payload, LIVE_STATUS_TTL)
            .await
    }

    /// Read the snapshot. A malformed payload is logged and reported as
    /// absent so the caller falls back to the durable store.
    pub async fn read(&self, job_id: &str) -> Result<Option<LiveStatus>> {
        let Some(raw) = self.kv.get(&keys::live_status(job_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(status) => Ok(Some(status)),
            Err(e) => {
                warn!(job_id, "Malformed live status payload, falling back: {e}");
                Ok(None)
            }
        }
    }

    /// Delete the snapshot; part of every terminal transition.
    pub async fn clear(&self, job_id: &str) -> Result<()> {
        self.kv.delete(&keys::live_status(job_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKvStore;

    fn cache() -> LiveStatusCache {
        LiveStatusCache::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn test_write_read_clear() {
        let cache = cache();
        let status = LiveStatus::running("Crawling 1/2", 2, 1, 0);

        cache.write("j1", &status).await.unwrap();
        assert_eq!(cache.read("j1").await.unwrap(), Some(status));

        cache.clear("j1").await.unwrap();
        assert_eq!(cache.read("j1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_entry_reads_as_none() {
        assert_eq!(cache().read("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_payload_reads_as_none() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set_with_ttl(&keys::live_status("j1"), "{not json", Duration::from_secs(60))
            .await
            .unwrap();
        let cache = LiveStatusCache::new(kv);
        assert_eq!(cache.read("j1").await.unwrap(), None);
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let status = LiveStatus::running("Crawling 1/2 URLs...", 2, 1, 0);
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains(r#""status":"RUNNING""#));
        assert!(json.contains(r#""urlsSubmitted":2"#));
        assert!(json.contains(r#""urlsSucceeded":1"#));
        assert!(json.contains(r#""urlsFailed":0"#));
    }
}
