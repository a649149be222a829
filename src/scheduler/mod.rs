//! Admission and priority engine.
//!
//! Holds the pending set, costs incoming tasks, and on every dispatch tick
//! picks the highest-priority task the cluster and the owning user's quota
//! can absorb right now.

pub mod estimate;
pub mod pending;
pub mod priority;
pub mod resource;
pub mod user_limit;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::Result;

pub use estimate::{ResourceEstimate, ResourceEstimator};
pub use pending::PendingTaskSet;
pub use priority::{DefaultPriorityStrategy, PrioritizedTask, PriorityStrategy};
pub use resource::{WorkerResourceMonitor, WorkerResourceStatus};
pub use user_limit::{UserResourceLimiter, UserUsage};

/// The scheduler façade: pending set + estimator + priority policy +
/// resource/quota snapshots.
pub struct TaskScheduler {
    pending: PendingTaskSet,
    strategy: Arc<dyn PriorityStrategy>,
    estimator: ResourceEstimator,
    monitor: Arc<WorkerResourceMonitor>,
    limiter: Arc<UserResourceLimiter>,
}

impl TaskScheduler {
    pub fn new(
        strategy: Arc<dyn PriorityStrategy>,
        estimator: ResourceEstimator,
        monitor: Arc<WorkerResourceMonitor>,
        limiter: Arc<UserResourceLimiter>,
    ) -> Self {
        Self {
            pending: PendingTaskSet::new(),
            strategy,
            estimator,
            monitor,
            limiter,
        }
    }

    /// Cost a consumed task record and admit it to the pending set.
    pub async fn add_task(
        &self,
        job_id: &str,
        user_id: Option<String>,
        urls: Vec<String>,
    ) -> Result<()> {
        let estimate = self.estimator.estimate(urls.len(), user_id.as_deref()).await;
        let task = PrioritizedTask::new(job_id, user_id, urls.len(), estimate, Utc::now());
        debug!(
            job_id,
            urls = task.url_count,
            threads = estimate.estimated_threads,
            "Added task to pending set"
        );
        self.pending.insert(task, urls);
        Ok(())
    }

    /// Pick the next executable task, removing it from the pending set.
    ///
    /// Scores every pending task against fresh resource and quota
    /// snapshots, then claims the best admissible one. Returns the task and
    /// its URL list, or `None` when nothing can start this tick.
    pub async fn next_executable(&self) -> Result<Option<(PrioritizedTask, Vec<String>)>> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let resources = self.monitor.current_status().await?;
        let mut tasks = self.pending.snapshot();
        let usage = self.usage_snapshot(&tasks).await;

        self.strategy
            .prioritize(&mut tasks, &resources, &usage, Utc::now());

        for task in tasks.into_iter().filter(|t| t.can_execute) {
            // Claim may lose to a concurrent tick; move on to the next task.
            let Some(claimed) = self.pending.claim(&task.job_id) else {
                continue;
            };
            let Some(urls) = self.pending.urls(&claimed.job_id) else {
                warn!(job_id = %claimed.job_id, "Pending task has no URL list; dropping");
                self.pending.remove(&claimed.job_id);
                continue;
            };
            debug!(
                job_id = %claimed.job_id,
                score = task.priority_score,
                "Selected task for execution"
            );
            // Return the freshly scored view rather than the stored one.
            return Ok(Some((task, urls)));
        }

        debug!(pending = self.pending.len(), "No executable task this tick");
        Ok(None)
    }

    /// Quota usage for every distinct user in the pending set. A failed
    /// read counts as zero usage so a KV hiccup cannot starve the queue.
    async fn usage_snapshot(&self, tasks: &[PrioritizedTask]) -> HashMap<String, UserUsage> {
        let mut usage = HashMap::new();
        for task in tasks {
            let Some(user_id) = task.user_id.as_deref() else {
                continue;
            };
            if usage.contains_key(user_id) {
                continue;
            }
            let user_usage = match self.limiter.usage(user_id).await {
                Ok(u) => u,
                Err(e) => {
                    warn!(user_id, "Failed to read user usage, assuming zero: {e}");
                    UserUsage::default()
                }
            };
            usage.insert(user_id.to_string(), user_usage);
        }
        usage
    }

    /// Drop a job's pending state (called after completion or failure).
    pub fn remove_task(&self, job_id: &str) {
        self.pending.remove(job_id);
        debug!(job_id, "Removed task from pending set");
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKvStore;
    use crate::config::{UserResourceLimitConfig, WorkerResourceConfig};
    use crate::database::models::JobRecord;
    use crate::database::repositories::{CompletionSample, JobRepository};
    use crate::{Error, Result};
    use async_trait::async_trait;

    struct NoHistory;

    #[async_trait]
    impl JobRepository for NoHistory {
        async fn create_job(&self, _job: &JobRecord) -> Result<()> {
            Ok(())
        }
        async fn get_job(&self, id: &str) -> Result<JobRecord> {
            Err(Error::not_found("Job", id))
        }
        async fn find_job(&self, _id: &str) -> Result<Option<JobRecord>> {
            Ok(None)
        }
        async fn mark_job_started(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn complete_job(
            &self,
            _id: &str,
            _urls_succeeded: i64,
            _urls_failed: i64,
            _result_html: &str,
            _execution_time_ms: i64,
        ) -> Result<u64> {
            Ok(1)
        }
        async fn fail_job(&self, _id: &str) -> Result<u64> {
            Ok(1)
        }
        async fn recent_completion_samples(
            &self,
            _user_id: Option<&str>,
            _limit: u32,
        ) -> Result<Vec<CompletionSample>> {
            Ok(vec![])
        }
    }

    fn scheduler_with(
        kv: Arc<MemoryKvStore>,
        worker: WorkerResourceConfig,
        limits: UserResourceLimitConfig,
    ) -> TaskScheduler {
        let repository: Arc<dyn JobRepository> = Arc::new(NoHistory);
        TaskScheduler::new(
            Arc::new(DefaultPriorityStrategy::new(limits)),
            ResourceEstimator::new(repository, 100),
            Arc::new(WorkerResourceMonitor::new(kv.clone(), worker)),
            Arc::new(UserResourceLimiter::new(kv, limits)),
        )
    }

    fn default_scheduler() -> TaskScheduler {
        scheduler_with(
            Arc::new(MemoryKvStore::new()),
            WorkerResourceConfig {
                total_instances: 4,
                max_threads_per_instance: 10,
            },
            UserResourceLimitConfig::default(),
        )
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://example.com/{i}")).collect()
    }

    #[tokio::test]
    async fn test_empty_scheduler_returns_none() {
        let scheduler = default_scheduler();
        assert!(scheduler.next_executable().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cheapest_task_dispatched_first() {
        let scheduler = default_scheduler();
        scheduler.add_task("big", None, urls(80)).await.unwrap();
        scheduler.add_task("small", None, urls(3)).await.unwrap();

        let (task, task_urls) = scheduler.next_executable().await.unwrap().unwrap();
        assert_eq!(task.job_id, "small");
        assert_eq!(task_urls.len(), 3);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_claimed_task_not_returned_twice() {
        let scheduler = default_scheduler();
        scheduler.add_task("only", None, urls(2)).await.unwrap();

        assert!(scheduler.next_executable().await.unwrap().is_some());
        assert!(scheduler.next_executable().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_quota_blocked_user_stays_pending() {
        let kv = Arc::new(MemoryKvStore::new());
        let scheduler = scheduler_with(
            kv.clone(),
            WorkerResourceConfig {
                total_instances: 4,
                max_threads_per_instance: 10,
            },
            UserResourceLimitConfig::default(),
        );

        // u1 sits at 49 of 50 threads; a 2-thread task must wait.
        let limiter = UserResourceLimiter::new(kv, UserResourceLimitConfig::default());
        limiter.record_start(Some("u1"), 49).await.unwrap();

        scheduler
            .add_task("blocked", Some("u1".to_string()), urls(10))
            .await
            .unwrap();

        assert!(scheduler.next_executable().await.unwrap().is_none());
        assert_eq!(scheduler.pending_count(), 1);

        // Releasing enough credit unblocks the task.
        limiter.release(Some("u1"), 1).await.unwrap();
        let (task, _) = scheduler.next_executable().await.unwrap().unwrap();
        assert_eq!(task.job_id, "blocked");
    }

    #[tokio::test]
    async fn test_cluster_saturation_blocks_dispatch() {
        let kv = Arc::new(MemoryKvStore::new());
        let worker = WorkerResourceConfig {
            total_instances: 1,
            max_threads_per_instance: 2,
        };
        let scheduler = scheduler_with(kv.clone(), worker, UserResourceLimitConfig::default());

        let monitor = WorkerResourceMonitor::new(kv, worker);
        monitor.register_job_start("running", 2).await.unwrap();

        scheduler.add_task("waiting", None, urls(30)).await.unwrap();
        assert!(scheduler.next_executable().await.unwrap().is_none());

        monitor.register_job_complete("running", 2).await.unwrap();
        // 30 URLs estimate 5 threads; the 2-thread cluster still refuses.
        assert!(scheduler.next_executable().await.unwrap().is_none());
    }
}
