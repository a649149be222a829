//! Worker-cluster resource accounting.
//!
//! The ledger lives in the shared KV store: a set of running job ids and a
//! single threads-in-use counter. Both keys expire after an hour so credits
//! leaked by a crashed dispatcher drain on their own.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{KvStore, keys};
use crate::config::WorkerResourceConfig;
use crate::Result;

/// TTL for the cluster-wide ledger keys.
const CLUSTER_KEY_TTL: Duration = Duration::from_secs(3600);

/// Threads assumed per running job when the counter key is missing.
const FALLBACK_THREADS_PER_JOB: i64 = 2;

/// Snapshot of cluster capacity and usage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerResourceStatus {
    pub total_instances: u32,
    pub total_threads: u32,
    pub used_instances: u32,
    pub used_threads: u32,
    pub available_instances: u32,
    pub available_threads: u32,
    pub utilization_rate: f64,
}

impl WorkerResourceStatus {
    pub fn new(total_instances: u32, total_threads: u32, used_instances: u32, used_threads: u32) -> Self {
        let available_instances = total_instances.saturating_sub(used_instances);
        let available_threads = total_threads.saturating_sub(used_threads);
        let utilization_rate = if total_threads > 0 {
            used_threads as f64 / total_threads as f64
        } else {
            0.0
        };
        Self {
            total_instances,
            total_threads,
            used_instances,
            used_threads,
            available_instances,
            available_threads,
            utilization_rate,
        }
    }

    /// Check whether the cluster can absorb a task needing `threads`.
    pub fn has_capacity_for(&self, threads: u32) -> bool {
        self.available_threads >= threads && self.available_instances > 0
    }
}

/// Reads and maintains the cluster ledger.
pub struct WorkerResourceMonitor {
    kv: Arc<dyn KvStore>,
    capacity: WorkerResourceConfig,
}

impl WorkerResourceMonitor {
    pub fn new(kv: Arc<dyn KvStore>, capacity: WorkerResourceConfig) -> Self {
        Self { kv, capacity }
    }

    /// Snapshot current cluster usage from the ledger.
    pub async fn current_status(&self) -> Result<WorkerResourceStatus> {
        let running_jobs = self.kv.set_len(keys::RUNNING_JOBS).await? as i64;

        let mut used_threads = match self.kv.get(keys::THREAD_USAGE).await? {
            Some(raw) => raw.parse::<i64>().unwrap_or_else(|_| {
                warn!("Invalid thread usage value in ledger: {raw}");
                0
            }),
            None => 0,
        };

        // Counter lost (expired or never written) while jobs are running:
        // estimate rather than report an idle cluster.
        if used_threads == 0 && running_jobs > 0 {
            used_threads = running_jobs * FALLBACK_THREADS_PER_JOB;
        }

        let total_threads = self.capacity.total_threads();
        let total_instances = self.capacity.total_instances;
        let used_threads = (used_threads.max(0) as u32).min(total_threads);
        let used_instances = (running_jobs.max(0) as u32).min(total_instances);

        Ok(WorkerResourceStatus::new(
            total_instances,
            total_threads,
            used_instances,
            used_threads,
        ))
    }

    /// Register a job start: add it to the running set and charge its
    /// thread estimate. Both keys get their TTL re-armed.
    pub async fn register_job_start(&self, job_id: &str, threads: u32) -> Result<()> {
        self.kv.set_add(keys::RUNNING_JOBS, job_id).await?;
        self.kv.expire(keys::RUNNING_JOBS, CLUSTER_KEY_TTL).await?;

        self.kv.incr_by(keys::THREAD_USAGE, threads as i64).await?;
        self.kv.expire(keys::THREAD_USAGE, CLUSTER_KEY_TTL).await?;

        debug!(job_id, threads, "Registered job start");
        Ok(())
    }

    /// Release a job's credits. The thread counter clamps at zero; going
    /// negative means a double release or TTL race and is logged.
    pub async fn register_job_complete(&self, job_id: &str, threads: u32) -> Result<()> {
        self.kv.set_remove(keys::RUNNING_JOBS, job_id).await?;

        let remaining = self.kv.decr_by(keys::THREAD_USAGE, threads as i64).await?;
        if remaining < 0 {
            warn!(
                job_id,
                remaining, "Thread usage counter went negative; clamping to zero"
            );
            self.kv
                .set_with_ttl(keys::THREAD_USAGE, "0", CLUSTER_KEY_TTL)
                .await?;
        }

        debug!(job_id, threads, "Registered job completion");
        Ok(())
    }

    /// Log current utilisation; driven by the periodic stats loop.
    pub async fn log_utilization(&self) -> Result<()> {
        let status = self.current_status().await?;
        debug!(
            "Resource status: threads={}/{}, instances={}/{}, utilization={:.2}",
            status.used_threads,
            status.total_threads,
            status.used_instances,
            status.total_instances,
            status.utilization_rate
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKvStore;

    fn monitor() -> WorkerResourceMonitor {
        let capacity = WorkerResourceConfig {
            total_instances: 2,
            max_threads_per_instance: 10,
        };
        WorkerResourceMonitor::new(Arc::new(MemoryKvStore::new()), capacity)
    }

    #[test]
    fn test_status_derivations() {
        let status = WorkerResourceStatus::new(2, 20, 1, 5);
        assert_eq!(status.available_instances, 1);
        assert_eq!(status.available_threads, 15);
        assert!((status.utilization_rate - 0.25).abs() < 1e-9);
        assert!(status.has_capacity_for(15));
        assert!(!status.has_capacity_for(16));
    }

    #[test]
    fn test_no_capacity_without_instances() {
        let status = WorkerResourceStatus::new(1, 10, 1, 2);
        assert!(!status.has_capacity_for(1));
    }

    #[tokio::test]
    async fn test_start_and_complete_roundtrip() {
        let monitor = monitor();
        monitor.register_job_start("j1", 3).await.unwrap();
        monitor.register_job_start("j2", 4).await.unwrap();

        let status = monitor.current_status().await.unwrap();
        assert_eq!(status.used_threads, 7);
        assert_eq!(status.used_instances, 2);

        monitor.register_job_complete("j1", 3).await.unwrap();
        let status = monitor.current_status().await.unwrap();
        assert_eq!(status.used_threads, 4);
        assert_eq!(status.used_instances, 1);
    }

    #[tokio::test]
    async fn test_negative_counter_clamped() {
        let monitor = monitor();
        monitor.register_job_start("j1", 2).await.unwrap();
        monitor.register_job_complete("j1", 5).await.unwrap();

        let status = monitor.current_status().await.unwrap();
        assert_eq!(status.used_threads, 0);
    }

    #[tokio::test]
    async fn test_fallback_estimate_when_counter_missing() {
        let monitor = monitor();
        // Running set has members but the counter key was never written.
        monitor.kv.set_add(keys::RUNNING_JOBS, "j1").await.unwrap();
        monitor.kv.set_add(keys::RUNNING_JOBS, "j2").await.unwrap();

        let status = monitor.current_status().await.unwrap();
        assert_eq!(status.used_threads, 4);
    }

    #[tokio::test]
    async fn test_usage_clamped_to_capacity() {
        let monitor = monitor();
        monitor.register_job_start("j1", 50).await.unwrap();
        let status = monitor.current_status().await.unwrap();
        assert_eq!(status.used_threads, status.total_threads);
    }
}
