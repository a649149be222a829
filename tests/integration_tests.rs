//! End-to-end tests for the crawld pipeline.
//!
//! These wire the real services against an in-memory SQLite database, the
//! in-process KV store and transport, and a stub crawler, then drive the
//! full submit -> intake -> dispatch -> terminal flow.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crawld::cache::{KvStore, MemoryKvStore, keys};
use crawld::config::{SchedulerConfig, UserResourceLimitConfig, WorkerResourceConfig};
use crawld::crawler::Crawler;
use crawld::database::models::{JobRecord, JobStatus};
use crawld::database::repositories::{JobRepository, SqlxJobRepository};
use crawld::database::{DbPool, run_migrations};
use crawld::dispatch::DispatchService;
use crawld::jobs::{JobService, LiveStatus, LiveStatusCache};
use crawld::scheduler::{
    DefaultPriorityStrategy, ResourceEstimator, TaskScheduler, UserResourceLimiter,
    WorkerResourceMonitor,
};
use crawld::transport::PartitionedChannelTransport;
use crawld::{Error, Result};

/// Stub crawler: instant pages, URLs containing "fail" error out.
struct StubCrawler;

#[async_trait]
impl Crawler for StubCrawler {
    async fn fetch(&self, url: &str) -> Result<String> {
        if url.contains("fail") {
            Err(Error::Crawl(format!("stub refused {url}")))
        } else {
            Ok(format!("<p>content of {url}</p>"))
        }
    }
}

struct Harness {
    pool: DbPool,
    repository: Arc<dyn JobRepository>,
    kv: Arc<MemoryKvStore>,
    live_status: Arc<LiveStatusCache>,
    limiter: Arc<UserResourceLimiter>,
    scheduler: Arc<TaskScheduler>,
    job_service: Arc<JobService>,
    dispatch: Arc<DispatchService>,
}

async fn harness() -> Harness {
    // Single connection so every query sees the same in-memory database.
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();

    let repository: Arc<dyn JobRepository> = Arc::new(SqlxJobRepository::new(pool.clone()));
    let kv = Arc::new(MemoryKvStore::new());
    let kv_dyn: Arc<dyn KvStore> = kv.clone();

    let worker = WorkerResourceConfig {
        total_instances: 2,
        max_threads_per_instance: 10,
    };
    let limits = UserResourceLimitConfig::default();
    let scheduler_config = SchedulerConfig {
        dispatch_interval_ms: 25,
        stats_interval_ms: 60_000,
        estimate_sample_size: 100,
    };

    let live_status = Arc::new(LiveStatusCache::new(kv_dyn.clone()));
    let monitor = Arc::new(WorkerResourceMonitor::new(kv_dyn.clone(), worker));
    let limiter = Arc::new(UserResourceLimiter::new(kv_dyn, limits));
    let scheduler = Arc::new(TaskScheduler::new(
        Arc::new(DefaultPriorityStrategy::new(limits)),
        ResourceEstimator::new(repository.clone(), 100),
        monitor.clone(),
        limiter.clone(),
    ));

    let transport = Arc::new(PartitionedChannelTransport::new(3));
    let job_service = Arc::new(JobService::new(
        repository.clone(),
        live_status.clone(),
        transport.clone(),
    ));
    let dispatch = Arc::new(DispatchService::new(
        scheduler.clone(),
        transport.clone(),
        repository.clone(),
        live_status.clone(),
        monitor,
        limiter.clone(),
        Arc::new(StubCrawler),
        scheduler_config,
    ));

    Harness {
        pool,
        repository,
        kv,
        live_status,
        limiter,
        scheduler,
        job_service,
        dispatch,
    }
}

async fn wait_for_status(
    repository: &Arc<dyn JobRepository>,
    job_id: &str,
    expected: JobStatus,
    timeout: Duration,
) -> JobRecord {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let record = repository.get_job(job_id).await.unwrap();
        if record.get_status() == Some(expected) {
            return record;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "job {job_id} never reached {expected:?}; last status {}",
                record.status
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn submit_then_status_is_pending() {
    let h = harness().await;

    let job_id = h
        .job_service
        .submit_job(vec!["https://a".into(), "https://b".into()], None)
        .await
        .unwrap();

    let view = h.job_service.job_status(&job_id).await.unwrap();
    assert_eq!(view.job_id, job_id);
    assert_eq!(view.status, JobStatus::Pending);
    assert_eq!(view.live_message, None);
    assert_eq!(view.urls_submitted, 2);
    assert_eq!(view.urls_succeeded, 0);
    assert_eq!(view.urls_failed, 0);
}

#[tokio::test]
async fn result_before_completion_is_rejected() {
    let h = harness().await;

    let job_id = h
        .job_service
        .submit_job(vec!["https://a".into(), "https://b".into()], None)
        .await
        .unwrap();

    let err = h.job_service.job_result(&job_id).await.unwrap_err();
    assert!(matches!(err, Error::JobNotCompleted { .. }));
}

#[tokio::test]
async fn live_entry_overrides_durable_row() {
    let h = harness().await;

    let job_id = h
        .job_service
        .submit_job(vec!["https://a".into(), "https://b".into()], None)
        .await
        .unwrap();

    h.live_status
        .write(&job_id, &LiveStatus::running("Crawling 1/2", 2, 1, 0))
        .await
        .unwrap();

    let view = h.job_service.job_status(&job_id).await.unwrap();
    assert_eq!(view.status, JobStatus::Running);
    assert_eq!(view.live_message.as_deref(), Some("Crawling 1/2"));
    assert_eq!(view.urls_submitted, 2);
    assert_eq!(view.urls_succeeded, 1);
    assert_eq!(view.urls_failed, 0);
}

#[tokio::test]
async fn empty_submit_is_rejected_without_a_row() {
    let h = harness().await;

    let err = h.job_service.submit_job(vec![], None).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn job_runs_to_succeeded_end_to_end() {
    let h = harness().await;
    h.dispatch.start();

    let job_id = h
        .job_service
        .submit_job(vec!["https://a".into(), "https://b".into()], None)
        .await
        .unwrap();

    let record = wait_for_status(
        &h.repository,
        &job_id,
        JobStatus::Succeeded,
        Duration::from_secs(5),
    )
    .await;

    // Count invariant on the terminal row.
    assert_eq!(record.urls_submitted, 2);
    assert_eq!(record.urls_succeeded + record.urls_failed, 2);
    assert_eq!(record.urls_failed, 0);
    assert!(record.execution_time_ms.is_some());
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());

    // The artifact is served and contains both pages.
    let html = h.job_service.job_result(&job_id).await.unwrap();
    assert!(html.contains("content of https://a"));
    assert!(html.contains("content of https://b"));

    // Terminal cleanup: live status gone, ledger drained, pending empty.
    assert_eq!(h.live_status.read(&job_id).await.unwrap(), None);
    assert_eq!(h.kv.set_len(keys::RUNNING_JOBS).await.unwrap(), 0);
    assert_eq!(h.scheduler.pending_count(), 0);

    h.dispatch.stop().await;
}

#[tokio::test]
async fn per_url_failures_are_counted_not_fatal() {
    let h = harness().await;
    h.dispatch.start();

    let job_id = h
        .job_service
        .submit_job(
            vec!["https://ok".into(), "https://fail.example".into()],
            None,
        )
        .await
        .unwrap();

    let record = wait_for_status(
        &h.repository,
        &job_id,
        JobStatus::Succeeded,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(record.urls_succeeded, 1);
    assert_eq!(record.urls_failed, 1);

    let html = h.job_service.job_result(&job_id).await.unwrap();
    assert!(html.contains("content of https://ok"));
    assert!(html.contains("stub refused https://fail.example"));

    h.dispatch.stop().await;
}

#[tokio::test]
async fn quota_blocked_job_waits_then_runs() {
    let h = harness().await;
    h.dispatch.start();

    // u1 already holds 49 of 50 window threads; a 2-thread job must wait.
    h.limiter.record_start(Some("u1"), 49).await.unwrap();

    let urls: Vec<String> = (0..10).map(|i| format!("https://site/{i}")).collect();
    let job_id = h
        .job_service
        .submit_job(urls, Some("u1".to_string()))
        .await
        .unwrap();

    // Several dispatch ticks pass without the job starting.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let record = h.repository.get_job(&job_id).await.unwrap();
    assert_eq!(record.status, "PENDING");
    assert_eq!(h.scheduler.pending_count(), 1);

    // Releasing thread credit unblocks it.
    h.limiter.release(Some("u1"), 1).await.unwrap();
    let record = wait_for_status(
        &h.repository,
        &job_id,
        JobStatus::Succeeded,
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(record.urls_succeeded, 10);

    h.dispatch.stop().await;
}

#[tokio::test]
async fn user_thread_budget_never_negative() {
    let h = harness().await;
    h.dispatch.start();

    let job_id = h
        .job_service
        .submit_job(vec!["https://a".into()], Some("u2".to_string()))
        .await
        .unwrap();
    wait_for_status(
        &h.repository,
        &job_id,
        JobStatus::Succeeded,
        Duration::from_secs(5),
    )
    .await;

    let usage = h.limiter.usage("u2").await.unwrap();
    assert!(usage.threads_in_use >= 0);
    assert_eq!(usage.threads_in_use, 0);
    // The job slot stays consumed until the window expires.
    assert_eq!(usage.jobs_started_in_window, 1);

    h.dispatch.stop().await;
}
