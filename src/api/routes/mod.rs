//! Route assembly.

pub mod jobs;

use axum::{Json, Router, extract::State, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::models::HealthResponse;
use super::server::AppState;

/// Build the full application router.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", jobs::router())
        .route("/api/v1/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
