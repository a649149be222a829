//! Work-queue transport.
//!
//! The queue between submit and intake is a partitioned, offset-acknowledged
//! stream: task records are keyed by job id so per-job ordering holds within
//! a partition, and offsets are committed manually only after the task has
//! landed in the pending set. `channel::PartitionedChannelTransport` is the
//! in-process binding; a broker-backed adapter implements the same traits.

pub mod channel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use channel::PartitionedChannelTransport;

/// The task record published at submit time and consumed by intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMessage {
    pub job_id: String,
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl TaskMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Acknowledgement returned by a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishAck {
    pub partition: usize,
    pub offset: u64,
}

/// One message handed to the consumer; must be committed or released.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub partition: usize,
    pub offset: u64,
    pub payload: String,
}

/// Producer side of the work queue.
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    /// Publish `payload` under `key`; the key selects the partition.
    async fn publish(&self, key: &str, payload: &str) -> Result<PublishAck>;
}

/// Consumer side of the work queue with manual offset management.
#[async_trait]
pub trait TaskConsumer: Send + Sync {
    /// Wait for the next uncommitted message. Per partition, at most one
    /// delivery is outstanding at a time.
    async fn recv(&self) -> Result<Delivery>;
    /// Commit the offset: the message will never be redelivered.
    async fn commit(&self, partition: usize, offset: u64) -> Result<()>;
    /// Hand an uncommitted delivery back for redelivery.
    async fn release(&self, partition: usize, offset: u64) -> Result<()>;
}
