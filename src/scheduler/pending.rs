//! The in-memory pending set.
//!
//! URL lists are kept in a side map so snapshotting and scoring the pending
//! tasks never clones the payloads.

use dashmap::DashMap;

use super::priority::PrioritizedTask;

/// Process-local set of tasks awaiting dispatch.
#[derive(Debug, Default)]
pub struct PendingTaskSet {
    tasks: DashMap<String, PrioritizedTask>,
    urls: DashMap<String, Vec<String>>,
}

impl PendingTaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task and its URL list.
    pub fn insert(&self, task: PrioritizedTask, urls: Vec<String>) {
        self.urls.insert(task.job_id.clone(), urls);
        self.tasks.insert(task.job_id.clone(), task);
    }

    /// Clone the current tasks for scoring.
    pub fn snapshot(&self) -> Vec<PrioritizedTask> {
        self.tasks.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Atomically take a task out of the set; the winner of concurrent
    /// claims gets `Some`, everyone else `None`. The URL list stays behind
    /// until `remove` so the execution driver can still read it.
    pub fn claim(&self, job_id: &str) -> Option<PrioritizedTask> {
        self.tasks.remove(job_id).map(|(_, task)| task)
    }

    /// URL list for a job, if still present.
    pub fn urls(&self, job_id: &str) -> Option<Vec<String>> {
        self.urls.get(job_id).map(|entry| entry.value().clone())
    }

    /// Drop all state for a job.
    pub fn remove(&self, job_id: &str) {
        self.tasks.remove(job_id);
        self.urls.remove(job_id);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
