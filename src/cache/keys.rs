//! Key layout for the shared KV store.
//!
//! All keys are namespaced so the ledger and the live-status cache never
//! collide with other tenants of the same store.

/// Set of currently running job ids (cluster-wide).
pub const RUNNING_JOBS: &str = "crawler:worker:running:jobs";

/// Integer count of crawl threads currently in use (cluster-wide).
pub const THREAD_USAGE: &str = "crawler:worker:thread:usage";

/// Live progress snapshot for one job.
pub fn live_status(job_id: &str) -> String {
    format!("scraping:job:live:status:{job_id}")
}

/// Per-user crawl-thread counter within the quota window.
pub fn user_threads(user_id: &str) -> String {
    format!("crawler:user:threads:{user_id}")
}

/// Per-user started-jobs counter within the quota window.
pub fn user_jobs(user_id: &str) -> String {
    format!("crawler:user:jobs:{user_id}")
}
