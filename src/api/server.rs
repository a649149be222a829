//! API server setup.

use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::routes;
use crate::config::ApiServerConfig;
use crate::jobs::JobService;
use crate::Result;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime reporting.
    pub start_time: Instant,
    pub job_service: Arc<JobService>,
}

impl AppState {
    pub fn new(job_service: Arc<JobService>) -> Self {
        Self {
            start_time: Instant::now(),
            job_service,
        }
    }
}

/// Bind and serve the API until the token is cancelled.
pub async fn serve(
    config: &ApiServerConfig,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = routes::api_router(state);
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("API server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server shut down");
    Ok(())
}
