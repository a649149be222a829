//! Job service: submit, status, result.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::live_status::LiveStatusCache;
use crate::database::models::{JobRecord, JobStatus};
use crate::database::repositories::JobRepository;
use crate::transport::{TaskMessage, TaskPublisher};
use crate::{Error, Result};

/// Reconciled status view returned by the status query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub live_message: Option<String>,
    pub urls_submitted: i64,
    pub urls_succeeded: i64,
    pub urls_failed: i64,
}

/// Client-facing job operations.
pub struct JobService {
    repository: Arc<dyn JobRepository>,
    live_status: Arc<LiveStatusCache>,
    publisher: Arc<dyn TaskPublisher>,
}

impl JobService {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        live_status: Arc<LiveStatusCache>,
        publisher: Arc<dyn TaskPublisher>,
    ) -> Self {
        Self {
            repository,
            live_status,
            publisher,
        }
    }

    /// Submit a batch of URLs as a new job.
    ///
    /// The PENDING row is durably written before the task record is
    /// published, so a status query straight after submit always finds the
    /// job. A publish failure surfaces as a transport error and leaves the
    /// PENDING row in place.
    pub async fn submit_job(
        &self,
        urls: Vec<String>,
        user_id: Option<String>,
    ) -> Result<String> {
        validate_urls(&urls)?;
        info!("Submitting new crawling job with {} URLs", urls.len());

        let record = JobRecord::new(urls.len() as i64, user_id.clone());
        let job_id = record.id.clone();
        self.repository.create_job(&record).await?;
        debug!(%job_id, "Job record saved");

        let message = TaskMessage {
            job_id: job_id.clone(),
            urls,
            user_id,
        };
        let payload = message.to_json()?;
        match self.publisher.publish(&job_id, &payload).await {
            Ok(ack) => {
                info!(
                    %job_id,
                    partition = ack.partition,
                    offset = ack.offset,
                    "Task record published"
                );
            }
            Err(e) => {
                // The PENDING row stays; operators recover via re-submission.
                error!(%job_id, "Failed to publish task record: {e}");
                return Err(Error::transport(format!(
                    "Failed to publish task record for job {job_id}: {e}"
                )));
            }
        }

        Ok(job_id)
    }

    /// Reconciled status: the live cache wins while an entry exists, the
    /// durable row answers otherwise.
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusView> {
        if let Some(live) = self.live_status.read(job_id).await? {
            debug!(job_id, "Serving live status");
            return Ok(JobStatusView {
                job_id: job_id.to_string(),
                status: live.status,
                live_message: Some(live.message),
                urls_submitted: live.urls_submitted,
                urls_succeeded: live.urls_succeeded,
                urls_failed: live.urls_failed,
            });
        }

        let Some(record) = self.repository.find_job(job_id).await? else {
            warn!(job_id, "Job not found");
            return Err(Error::not_found("Job", job_id));
        };

        let status = record
            .get_status()
            .ok_or_else(|| Error::internal(format!("corrupt status '{}'", record.status)))?;

        Ok(JobStatusView {
            job_id: record.id,
            status,
            live_message: None,
            urls_submitted: record.urls_submitted,
            urls_succeeded: record.urls_succeeded,
            urls_failed: record.urls_failed,
        })
    }

    /// The terminal artifact; available only once the job SUCCEEDED.
    pub async fn job_result(&self, job_id: &str) -> Result<String> {
        let Some(record) = self.repository.find_job(job_id).await? else {
            warn!(job_id, "Job not found");
            return Err(Error::not_found("Job", job_id));
        };

        if record.get_status() != Some(JobStatus::Succeeded) {
            return Err(Error::JobNotCompleted {
                id: record.id,
                status: record.status,
            });
        }

        match record.result_html {
            Some(html) if !html.is_empty() => Ok(html),
            _ => {
                error!(job_id, "SUCCEEDED job has an empty result artifact");
                Err(Error::internal(format!(
                    "Job {job_id} result artifact is empty"
                )))
            }
        }
    }
}

fn validate_urls(urls: &[String]) -> Result<()> {
    if urls.is_empty() {
        return Err(Error::validation("urls: URL list cannot be empty"));
    }
    for (index, url) in urls.iter().enumerate() {
        if url.trim().is_empty() {
            return Err(Error::validation(format!(
                "urls[{index}]: URL cannot be blank"
            )));
        }
    }
    Ok(())
}
