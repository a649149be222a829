//! Task resource estimation.
//!
//! New tasks are costed from the execution history of recently completed
//! jobs: the average crawl time per URL drives the duration estimate, and a
//! stepwise function of the URL count drives the thread estimate.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::database::repositories::JobRepository;

const MIN_THREADS: u32 = 1;
const MAX_THREADS: u32 = 10;

/// Per-URL duration used when no history is available.
const DEFAULT_DURATION_PER_URL_MS: u64 = 2000;
/// Clamp bounds for the per-URL duration estimate.
const MIN_DURATION_PER_URL_MS: u64 = 100;
const MAX_DURATION_PER_URL_MS: u64 = 30_000;

/// Duration normalisation ceiling for the resource score.
const SCORE_DURATION_CEILING_MS: f64 = 30_000.0;

/// Estimated resource demand of one task; immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceEstimate {
    /// Crawl threads the task is expected to occupy, in [1, 10].
    pub estimated_threads: u32,
    /// Projected total crawl duration in milliseconds.
    pub estimated_duration_ms: u64,
    /// Composite cost in [0, 1]; lower is cheaper.
    pub resource_score: f64,
}

/// History-driven resource estimator.
pub struct ResourceEstimator {
    repository: Arc<dyn JobRepository>,
    sample_size: u32,
}

impl ResourceEstimator {
    pub fn new(repository: Arc<dyn JobRepository>, sample_size: u32) -> Self {
        Self {
            repository,
            sample_size,
        }
    }

    /// Estimate the resources a task of `url_count` URLs will need.
    ///
    /// Repository failures fall back to the default per-URL duration; the
    /// estimate itself never fails.
    pub async fn estimate(&self, url_count: usize, user_id: Option<&str>) -> ResourceEstimate {
        let duration_per_url = self.duration_per_url_ms(user_id).await;
        let estimated_duration_ms = duration_per_url.saturating_mul(url_count as u64);
        let estimated_threads = estimate_threads(url_count);
        let resource_score = resource_score(estimated_threads, estimated_duration_ms);

        debug!(
            url_count,
            estimated_threads, estimated_duration_ms, resource_score, "Resource estimation"
        );

        ResourceEstimate {
            estimated_threads,
            estimated_duration_ms,
            resource_score,
        }
    }

    /// Mean of per-job `execution_time_ms / urls_submitted` ratios over the
    /// most recent completions, clamped to [100, 30000] ms.
    async fn duration_per_url_ms(&self, user_id: Option<&str>) -> u64 {
        let samples = match self
            .repository
            .recent_completion_samples(user_id, self.sample_size)
            .await
        {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Failed to load completion history, using default estimate: {e}");
                return DEFAULT_DURATION_PER_URL_MS;
            }
        };

        // A user with no history of their own falls back to the global one.
        let samples = if samples.is_empty() && user_id.is_some() {
            match self.repository.recent_completion_samples(None, self.sample_size).await {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("Failed to load completion history, using default estimate: {e}");
                    return DEFAULT_DURATION_PER_URL_MS;
                }
            }
        } else {
            samples
        };

        if samples.is_empty() {
            return DEFAULT_DURATION_PER_URL_MS;
        }

        let total: f64 = samples
            .iter()
            .map(|s| s.execution_time_ms as f64 / s.urls_submitted as f64)
            .sum();
        let mean = (total / samples.len() as f64) as u64;
        mean.clamp(MIN_DURATION_PER_URL_MS, MAX_DURATION_PER_URL_MS)
    }
}

/// Thread demand as a stepwise function of the URL count.
fn estimate_threads(url_count: usize) -> u32 {
    let threads = if url_count <= 5 {
        1
    } else if url_count <= 20 {
        (url_count as u32 / 7 + 1).min(3)
    } else if url_count <= 50 {
        (url_count as u32 / 10 + 2).min(6)
    } else {
        (url_count as u32 / 10 + 3).min(MAX_THREADS)
    };
    threads.clamp(MIN_THREADS, MAX_THREADS)
}

/// Composite cost: 60% thread demand, 40% projected duration.
fn resource_score(threads: u32, duration_ms: u64) -> f64 {
    let normalized_threads = (threads as f64 / MAX_THREADS as f64).min(1.0);
    let normalized_duration = (duration_ms as f64 / SCORE_DURATION_CEILING_MS).min(1.0);
    normalized_threads * 0.6 + normalized_duration * 0.4
}
