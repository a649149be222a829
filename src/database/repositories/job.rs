//! Job repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

use crate::database::models::JobRecord;
use crate::{Error, Result};

/// One completed-job sample for the resource estimator.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct CompletionSample {
    pub execution_time_ms: i64,
    pub urls_submitted: i64,
}

/// Job repository trait.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create_job(&self, job: &JobRecord) -> Result<()>;
    /// Fetch a job, failing with `NotFound` when absent.
    async fn get_job(&self, id: &str) -> Result<JobRecord>;
    async fn find_job(&self, id: &str) -> Result<Option<JobRecord>>;
    /// Record the moment the dispatcher picked the job up.
    async fn mark_job_started(&self, id: &str) -> Result<()>;
    /// Transition a non-terminal job to SUCCEEDED with its artifact.
    /// Returns the number of rows updated (0 means the job was already
    /// terminal and the write was a no-op).
    async fn complete_job(
        &self,
        id: &str,
        urls_succeeded: i64,
        urls_failed: i64,
        result_html: &str,
        execution_time_ms: i64,
    ) -> Result<u64>;
    /// Transition a non-terminal job to FAILED.
    /// Returns the number of rows updated.
    async fn fail_job(&self, id: &str) -> Result<u64>;
    /// Recently completed jobs (newest first) for duration estimation,
    /// optionally restricted to one user.
    async fn recent_completion_samples(
        &self,
        user_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CompletionSample>>;
}

/// SQLx implementation of JobRepository.
pub struct SqlxJobRepository {
    pool: SqlitePool,
}

impl SqlxJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn create_job(&self, job: &JobRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job (
                id, status, result_html, urls_submitted, urls_succeeded, urls_failed,
                user_id, execution_time_ms, started_at, completed_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.status)
        .bind(&job.result_html)
        .bind(job.urls_submitted)
        .bind(job.urls_succeeded)
        .bind(job.urls_failed)
        .bind(&job.user_id)
        .bind(job.execution_time_ms)
        .bind(&job.started_at)
        .bind(&job.completed_at)
        .bind(&job.created_at)
        .bind(&job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<JobRecord> {
        self.find_job(id)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn find_job(&self, id: &str) -> Result<Option<JobRecord>> {
        let job = sqlx::query_as::<_, JobRecord>("SELECT * FROM job WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn mark_job_started(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE job SET started_at = ?, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete_job(
        &self,
        id: &str,
        urls_succeeded: i64,
        urls_failed: i64,
        result_html: &str,
        execution_time_ms: i64,
    ) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let res = sqlx::query(
            r#"
            UPDATE job
            SET status = 'SUCCEEDED', urls_succeeded = ?, urls_failed = ?,
                result_html = ?, execution_time_ms = ?, completed_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('PENDING', 'RUNNING')
            "#,
        )
        .bind(urls_succeeded)
        .bind(urls_failed)
        .bind(result_html)
        .bind(execution_time_ms)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn fail_job(&self, id: &str) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let res = sqlx::query(
            r#"
            UPDATE job
            SET status = 'FAILED', completed_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('PENDING', 'RUNNING')
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn recent_completion_samples(
        &self,
        user_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CompletionSample>> {
        let samples = sqlx::query_as::<_, CompletionSample>(
            r#"
            SELECT execution_time_ms, urls_submitted FROM job
            WHERE status = 'SUCCEEDED'
              AND execution_time_ms IS NOT NULL
              AND execution_time_ms > 0
              AND urls_submitted > 0
              AND (?1 IS NULL OR user_id = ?1)
            ORDER BY completed_at DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(samples)
    }
}
