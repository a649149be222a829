//! API request/response models.

use serde::{Deserialize, Serialize};

/// Request body for submitting a crawl job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    pub urls: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Response body for a successful submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: String,
}

/// Health probe response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
}
