//! Job database model.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Job status values.
///
/// `RUNNING` is the live-cache view of an executing job; the durable row
/// stays `PENDING` until a terminal transition is written.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job is queued and waiting to be picked up by the dispatcher.
    Pending,
    /// Job is currently being crawled.
    Running,
    /// Job finished and its result artifact is available.
    Succeeded,
    /// The job driver failed; no result artifact.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Job database record.
///
/// Timestamps are stored as ISO 8601 strings.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    /// Status: PENDING, RUNNING, SUCCEEDED, FAILED
    pub status: String,
    /// Assembled HTML artifact; populated only on SUCCEEDED.
    pub result_html: Option<String>,
    pub urls_submitted: i64,
    pub urls_succeeded: i64,
    pub urls_failed: i64,
    /// Submitting user, when the client identified one.
    pub user_id: Option<String>,
    /// Wall-clock crawl duration in milliseconds.
    pub execution_time_ms: Option<i64>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRecord {
    /// Create a new PENDING job record with a fresh UUID.
    pub fn new(urls_submitted: i64, user_id: Option<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Pending.as_str().to_string(),
            result_html: None,
            urls_submitted,
            urls_succeeded: 0,
            urls_failed: 0,
            user_id,
            execution_time_ms: None,
            started_at: None,
            completed_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Mark the job as picked up by the dispatcher.
    pub fn mark_started(&mut self) {
        let now = Utc::now().to_rfc3339();
        self.started_at = Some(now.clone());
        self.updated_at = now;
    }

    /// Mark the job as succeeded with its artifact and final counts.
    pub fn mark_succeeded(
        &mut self,
        urls_succeeded: i64,
        urls_failed: i64,
        result_html: impl Into<String>,
        execution_time_ms: i64,
    ) {
        let now = Utc::now().to_rfc3339();
        self.status = JobStatus::Succeeded.as_str().to_string();
        self.urls_succeeded = urls_succeeded;
        self.urls_failed = urls_failed;
        self.result_html = Some(result_html.into());
        self.execution_time_ms = Some(execution_time_ms);
        self.completed_at = Some(now.clone());
        self.updated_at = now;
    }

    /// Mark the job as failed.
    pub fn mark_failed(&mut self) {
        let now = Utc::now().to_rfc3339();
        self.status = JobStatus::Failed.as_str().to_string();
        self.completed_at = Some(now.clone());
        self.updated_at = now;
    }

    /// Get the job status as an enum.
    pub fn get_status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }
}
