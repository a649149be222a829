//! Task priority policy.
//!
//! Pending tasks are scored against a snapshot of cluster resources and
//! per-user quota usage. Lower scores rank higher; cheap tasks go first and
//! waiting tasks gradually climb the queue.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::estimate::ResourceEstimate;
use super::resource::WorkerResourceStatus;
use super::user_limit::UserUsage;
use crate::config::UserResourceLimitConfig;

/// Weight of the resource cost component.
const RESOURCE_WEIGHT: f64 = 0.7;
/// Weight of the wait-time compensation component.
const WAIT_WEIGHT: f64 = 0.3;
/// Wait time at which the compensation saturates.
const MAX_WAIT_MS: i64 = 300_000;
/// Sentinel score for tasks whose user currently fails the quota check.
/// They stay queued but sort behind everything admissible.
pub const QUOTA_BLOCKED_SCORE: f64 = 1000.0;

/// A pending task with its scoring state.
#[derive(Debug, Clone)]
pub struct PrioritizedTask {
    pub job_id: String,
    pub user_id: Option<String>,
    pub url_count: usize,
    pub estimate: ResourceEstimate,
    pub submit_time: DateTime<Utc>,
    pub priority_score: f64,
    pub can_execute: bool,
}

impl PrioritizedTask {
    pub fn new(
        job_id: impl Into<String>,
        user_id: Option<String>,
        url_count: usize,
        estimate: ResourceEstimate,
        submit_time: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            user_id,
            url_count,
            estimate,
            submit_time,
            priority_score: 0.0,
            can_execute: false,
        }
    }
}

/// Priority policy: scores and orders pending tasks, and decides which may
/// start right now.
pub trait PriorityStrategy: Send + Sync {
    /// Score every task against the given snapshots and sort the slice,
    /// highest priority (lowest score) first.
    fn prioritize(
        &self,
        tasks: &mut [PrioritizedTask],
        resources: &WorkerResourceStatus,
        usage: &HashMap<String, UserUsage>,
        now: DateTime<Utc>,
    );

    /// Check whether a task could be dispatched immediately.
    fn can_execute_immediately(
        &self,
        task: &PrioritizedTask,
        resources: &WorkerResourceStatus,
        usage: &HashMap<String, UserUsage>,
    ) -> bool;
}

/// Default policy: 70% resource cost, 30% wait-time compensation, quota
/// violators parked at the back of the queue.
pub struct DefaultPriorityStrategy {
    limits: UserResourceLimitConfig,
}

impl DefaultPriorityStrategy {
    pub fn new(limits: UserResourceLimitConfig) -> Self {
        Self { limits }
    }

    /// Projected post-start usage must stay within the user's window quota.
    /// Anonymous tasks are not quota-limited.
    fn within_user_quota(
        &self,
        task: &PrioritizedTask,
        usage: &HashMap<String, UserUsage>,
    ) -> bool {
        let Some(user_id) = task.user_id.as_deref() else {
            return true;
        };
        let current = usage.get(user_id).copied().unwrap_or_default();
        let projected_threads = current.threads_in_use + task.estimate.estimated_threads as i64;
        projected_threads <= self.limits.max_threads_per_window
            && current.jobs_started_in_window < self.limits.max_jobs_per_window
    }
}

impl PriorityStrategy for DefaultPriorityStrategy {
    fn prioritize(
        &self,
        tasks: &mut [PrioritizedTask],
        resources: &WorkerResourceStatus,
        usage: &HashMap<String, UserUsage>,
        now: DateTime<Utc>,
    ) {
        for task in tasks.iter_mut() {
            if !self.within_user_quota(task, usage) {
                task.priority_score = QUOTA_BLOCKED_SCORE;
                task.can_execute = false;
                continue;
            }

            let wait_ms = (now - task.submit_time).num_milliseconds().max(0);
            let wait_norm = (wait_ms as f64 / MAX_WAIT_MS as f64).min(1.0);
            task.priority_score =
                task.estimate.resource_score * RESOURCE_WEIGHT - wait_norm * WAIT_WEIGHT;
            task.can_execute = self.can_execute_immediately(task, resources, usage);
        }

        tasks.sort_by(|a, b| {
            a.priority_score
                .partial_cmp(&b.priority_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.submit_time.cmp(&b.submit_time))
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
    }

    fn can_execute_immediately(
        &self,
        task: &PrioritizedTask,
        resources: &WorkerResourceStatus,
        usage: &HashMap<String, UserUsage>,
    ) -> bool {
        resources.has_capacity_for(task.estimate.estimated_threads)
            && self.within_user_quota(task, usage)
    }
}
