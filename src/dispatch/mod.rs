//! Intake and dispatch.
//!
//! Three background loops drive the pipeline: the intake loop consumes task
//! records into the pending set (committing offsets only once a task is
//! safely pending), the dispatch loop asks the scheduler for one executable
//! task per tick and spawns its execution, and the stats loop periodically
//! logs cluster utilisation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::crawler::{Crawler, ResultPageBuilder};
use crate::database::repositories::JobRepository;
use crate::jobs::{LiveStatus, LiveStatusCache};
use crate::scheduler::{PrioritizedTask, TaskScheduler, UserResourceLimiter, WorkerResourceMonitor};
use crate::transport::{Delivery, TaskConsumer, TaskMessage};
use crate::Result;

/// Runs the intake, dispatch and stats loops and drives job execution.
pub struct DispatchService {
    scheduler: Arc<TaskScheduler>,
    consumer: Arc<dyn TaskConsumer>,
    repository: Arc<dyn JobRepository>,
    live_status: Arc<LiveStatusCache>,
    monitor: Arc<WorkerResourceMonitor>,
    limiter: Arc<UserResourceLimiter>,
    crawler: Arc<dyn Crawler>,
    config: SchedulerConfig,
    cancellation: CancellationToken,
    loops: Mutex<Option<JoinSet<()>>>,
}

impl DispatchService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scheduler: Arc<TaskScheduler>,
        consumer: Arc<dyn TaskConsumer>,
        repository: Arc<dyn JobRepository>,
        live_status: Arc<LiveStatusCache>,
        monitor: Arc<WorkerResourceMonitor>,
        limiter: Arc<UserResourceLimiter>,
        crawler: Arc<dyn Crawler>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            scheduler,
            consumer,
            repository,
            live_status,
            monitor,
            limiter,
            crawler,
            config,
            cancellation: CancellationToken::new(),
            loops: Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Spawn the background loops.
    pub fn start(self: &Arc<Self>) {
        info!(
            dispatch_interval_ms = self.config.dispatch_interval_ms,
            "Starting dispatch service"
        );

        let mut loops = self.loops.lock();
        if let Some(join_set) = loops.as_mut() {
            let service = self.clone();
            join_set.spawn(async move { service.intake_loop().await });

            let service = self.clone();
            join_set.spawn(async move { service.dispatch_loop().await });

            let service = self.clone();
            join_set.spawn(async move { service.stats_loop().await });
        }
    }

    /// Cancel the loops and wait for them to finish. In-flight crawls run
    /// to completion on their own tasks.
    pub async fn stop(&self) {
        info!("Stopping dispatch service");
        self.cancellation.cancel();

        let join_set = {
            let mut loops = self.loops.lock();
            loops.take()
        };
        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }
        info!("Dispatch service stopped");
    }

    async fn intake_loop(&self) {
        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => break,
                delivery = self.consumer.recv() => {
                    match delivery {
                        Ok(delivery) => self.handle_delivery(delivery).await,
                        Err(e) => {
                            error!("Transport receive failed: {e}");
                            tokio::time::sleep(Duration::from_millis(500)).await;
                        }
                    }
                }
            }
        }
        debug!("Intake loop shut down");
    }

    /// Intake one task record.
    ///
    /// Malformed records are committed so they cannot wedge the partition;
    /// a failure before the task reaches the pending set releases the
    /// delivery for redelivery.
    async fn handle_delivery(&self, delivery: Delivery) {
        debug!(
            partition = delivery.partition,
            offset = delivery.offset,
            "Received task record"
        );

        let message = match TaskMessage::from_json(&delivery.payload) {
            Ok(message) if !message.job_id.is_empty() && !message.urls.is_empty() => message,
            Ok(_) => {
                error!(
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Invalid task record (missing job id or urls); skipping"
                );
                self.commit(&delivery).await;
                return;
            }
            Err(e) => {
                error!(
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Malformed task record; skipping: {e}"
                );
                self.commit(&delivery).await;
                return;
            }
        };

        match self
            .scheduler
            .add_task(&message.job_id, message.user_id.clone(), message.urls)
            .await
        {
            Ok(()) => {
                info!(
                    job_id = %message.job_id,
                    "Task admitted to pending set"
                );
                self.commit(&delivery).await;
            }
            Err(e) => {
                error!(
                    job_id = %message.job_id,
                    "Failed to admit task; releasing for redelivery: {e}"
                );
                if let Err(e) = self
                    .consumer
                    .release(delivery.partition, delivery.offset)
                    .await
                {
                    error!("Failed to release delivery: {e}");
                }
            }
        }
    }

    async fn commit(&self, delivery: &Delivery) {
        if let Err(e) = self.consumer.commit(delivery.partition, delivery.offset).await {
            error!(
                partition = delivery.partition,
                offset = delivery.offset,
                "Failed to commit offset: {e}"
            );
        }
    }

    async fn dispatch_loop(self: &Arc<Self>) {
        let interval = Duration::from_millis(self.config.dispatch_interval_ms);
        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.dispatch_tick().await;
        }
        debug!("Dispatch loop shut down");
    }

    /// One tick: pick the next executable task and spawn its execution.
    /// Errors never propagate out of the tick.
    async fn dispatch_tick(self: &Arc<Self>) {
        match self.scheduler.next_executable().await {
            Ok(Some((task, urls))) => {
                info!(
                    job_id = %task.job_id,
                    score = task.priority_score,
                    threads = task.estimate.estimated_threads,
                    "Dispatching task"
                );
                let service = self.clone();
                tokio::spawn(async move { service.execute_job(task, urls).await });
            }
            Ok(None) => {}
            Err(e) => error!("Dispatch tick failed: {e}"),
        }
    }

    async fn stats_loop(&self) {
        let interval = Duration::from_millis(self.config.stats_interval_ms);
        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = self.monitor.log_utilization().await {
                error!("Failed to read resource status: {e}");
            }
        }
        debug!("Stats loop shut down");
    }

    /// Execute one dispatched job end to end.
    ///
    /// Ledger credits are registered before and released after the crawl;
    /// any driver failure marks the job FAILED and still releases them.
    async fn execute_job(&self, task: PrioritizedTask, urls: Vec<String>) {
        let job_id = task.job_id.as_str();
        let user_id = task.user_id.as_deref();
        let threads = task.estimate.estimated_threads;

        if let Err(e) = self.monitor.register_job_start(job_id, threads).await {
            error!(job_id, "Failed to register job start in ledger: {e}");
        }
        if let Err(e) = self.limiter.record_start(user_id, threads).await {
            error!(job_id, "Failed to record user resource usage: {e}");
        }

        let started = Instant::now();
        if let Err(e) = self.drive_crawl(job_id, &urls, started).await {
            error!(job_id, "Job driver failed: {e}");
            self.finish_failed(job_id).await;
        }

        if let Err(e) = self.monitor.register_job_complete(job_id, threads).await {
            error!(job_id, "Failed to release ledger credits: {e}");
        }
        if let Err(e) = self.limiter.release(user_id, threads).await {
            error!(job_id, "Failed to release user resources: {e}");
        }
        self.scheduler.remove_task(job_id);
    }

    /// Crawl every URL, stream progress through the live cache, and write
    /// the terminal SUCCEEDED row. Per-URL failures are counted, not raised.
    async fn drive_crawl(&self, job_id: &str, urls: &[String], started: Instant) -> Result<()> {
        let total = urls.len();
        info!(job_id, urls = total, "Processing crawl job");

        self.repository.mark_job_started(job_id).await?;
        self.update_live_status(job_id, total as i64, 0, 0, "Starting to crawl...")
            .await;

        let mut report = ResultPageBuilder::new(total);
        for (index, url) in urls.iter().enumerate() {
            let message = format!(
                "Crawling {}/{} URLs... (Current: {})",
                index + 1,
                total,
                url
            );
            self.update_live_status(
                job_id,
                total as i64,
                report.succeeded() as i64,
                report.failed() as i64,
                &message,
            )
            .await;

            match self.crawler.fetch(url).await {
                Ok(content) => {
                    debug!(job_id, url, "Crawled URL");
                    report.push_success(url, &content);
                }
                Err(e) => {
                    warn!(job_id, url, "Failed to crawl URL: {e}");
                    report.push_failure(url, &e.to_string());
                }
            }
        }

        let succeeded = report.succeeded() as i64;
        let failed = report.failed() as i64;
        let html = report.finish();
        let execution_time_ms = started.elapsed().as_millis() as i64;

        let updated = self
            .repository
            .complete_job(job_id, succeeded, failed, &html, execution_time_ms)
            .await?;
        if updated == 0 {
            warn!(job_id, "Job was already terminal; completion skipped");
        } else {
            info!(
                job_id,
                succeeded, failed, execution_time_ms, "Job completed"
            );
        }

        self.clear_live_status(job_id).await;
        Ok(())
    }

    /// Terminal FAILED write plus live-status cleanup.
    async fn finish_failed(&self, job_id: &str) {
        match self.repository.fail_job(job_id).await {
            Ok(0) => warn!(job_id, "Job was already terminal; failure skipped"),
            Ok(_) => warn!(job_id, "Job marked FAILED"),
            Err(e) => error!(job_id, "Failed to mark job FAILED: {e}"),
        }
        self.clear_live_status(job_id).await;
    }

    async fn update_live_status(
        &self,
        job_id: &str,
        urls_submitted: i64,
        urls_succeeded: i64,
        urls_failed: i64,
        message: &str,
    ) {
        let status = LiveStatus::running(message, urls_submitted, urls_succeeded, urls_failed);
        if let Err(e) = self.live_status.write(job_id, &status).await {
            warn!(job_id, "Failed to update live status: {e}");
        }
    }

    async fn clear_live_status(&self, job_id: &str) {
        if let Err(e) = self.live_status.clear(job_id).await {
            warn!(job_id, "Failed to clear live status: {e}");
        }
    }
}
