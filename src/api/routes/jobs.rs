//! Job routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/api/v1/jobs` | Submit a batch of URLs as a new job |
//! | GET | `/api/v1/jobs/{jobId}/status` | Reconciled live/durable status |
//! | GET | `/api/v1/jobs/{jobId}/result` | Terminal HTML artifact |

use axum::{
    Json, Router,
    extract::{Path, State},
    response::Html,
    routing::{get, post},
};
use tracing::{debug, info};

use crate::api::error::ApiResult;
use crate::api::models::{SubmitJobRequest, SubmitJobResponse};
use crate::api::server::AppState;
use crate::jobs::JobStatusView;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/{job_id}/status", get(job_status))
        .route("/jobs/{job_id}/result", get(job_result))
}

async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<Json<SubmitJobResponse>> {
    info!("Received job submission with {} URLs", request.urls.len());
    let job_id = state
        .job_service
        .submit_job(request.urls, request.user_id)
        .await?;
    Ok(Json(SubmitJobResponse { job_id }))
}

async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    debug!(%job_id, "Status query");
    let view = state.job_service.job_status(&job_id).await?;
    Ok(Json(view))
}

async fn job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Html<String>> {
    debug!(%job_id, "Result query");
    let html = state.job_service.job_result(&job_id).await?;
    Ok(Html(html))
}
