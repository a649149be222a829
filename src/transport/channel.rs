//! In-process partitioned transport.
//!
//! Reproduces the broker contract the dispatcher relies on: key-hashed
//! partition selection, per-partition FIFO delivery, manual offset commit,
//! and at-least-once redelivery of released messages.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use tokio::sync::Notify;
use tracing::debug;

use super::{Delivery, PublishAck, TaskConsumer, TaskPublisher};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct Partition {
    /// Message log; a message's offset is its index.
    entries: Vec<String>,
    /// First offset that has not been committed.
    committed: u64,
    /// Offset currently handed out and awaiting commit/release.
    in_flight: Option<u64>,
}

/// Partitioned in-process work queue.
pub struct PartitionedChannelTransport {
    partitions: Vec<Mutex<Partition>>,
    notify: Notify,
}

impl PartitionedChannelTransport {
    pub fn new(partitions: usize) -> Self {
        let partitions = partitions.max(1);
        Self {
            partitions: (0..partitions).map(|_| Mutex::new(Partition::default())).collect(),
            notify: Notify::new(),
        }
    }

    fn partition_for(&self, key: &str) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.partitions.len()
    }

    fn try_next(&self) -> Option<Delivery> {
        for (idx, partition) in self.partitions.iter().enumerate() {
            let mut state = partition.lock();
            if state.in_flight.is_none() && (state.committed as usize) < state.entries.len() {
                let offset = state.committed;
                state.in_flight = Some(offset);
                return Some(Delivery {
                    partition: idx,
                    offset,
                    payload: state.entries[offset as usize].clone(),
                });
            }
        }
        None
    }

    /// Total messages not yet committed, in flight included.
    pub fn backlog(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| {
                let state = p.lock();
                state.entries.len() - state.committed as usize
            })
            .sum()
    }
}

#[async_trait]
impl TaskPublisher for PartitionedChannelTransport {
    async fn publish(&self, key: &str, payload: &str) -> Result<PublishAck> {
        let idx = self.partition_for(key);
        let offset = {
            let mut state = self.partitions[idx].lock();
            let offset = state.entries.len() as u64;
            state.entries.push(payload.to_string());
            offset
        };
        debug!(partition = idx, offset, "Published task record");
        self.notify.notify_one();
        Ok(PublishAck {
            partition: idx,
            offset,
        })
    }
}

#[async_trait]
impl TaskConsumer for PartitionedChannelTransport {
    async fn recv(&self) -> Result<Delivery> {
        loop {
            let notified = self.notify.notified();
            if let Some(delivery) = self.try_next() {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn commit(&self, partition: usize, offset: u64) -> Result<()> {
        let mut state = self
            .partitions
            .get(partition)
            .ok_or_else(|| Error::transport(format!("unknown partition {partition}")))?
            .lock();
        if state.in_flight != Some(offset) {
            return Err(Error::transport(format!(
                "commit for partition {partition} offset {offset} does not match in-flight delivery"
            )));
        }
        state.committed = offset + 1;
        state.in_flight = None;
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    async fn release(&self, partition: usize, offset: u64) -> Result<()> {
        let mut state = self
            .partitions
            .get(partition)
            .ok_or_else(|| Error::transport(format!("unknown partition {partition}")))?
            .lock();
        if state.in_flight == Some(offset) {
            state.in_flight = None;
        }
        drop(state);
        self.notify.notify_one();
        Ok(())
    }
}
