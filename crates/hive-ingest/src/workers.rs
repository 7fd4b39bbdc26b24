//! Sharded ingest worker pool.
//!
//! Readings are routed to one of N bounded queues by a hash of the device
//! key, so all readings for one device are processed in arrival order by the
//! same worker. A full queue makes [`WorkQueue::dispatch`] wait, which in
//! turn stalls the broker event loop.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use hive_core::{DeviceKey, Reading};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::pipeline::IngestPipeline;

/// The worker pool has shut down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("ingest queue closed")]
pub struct QueueClosed;

/// Sending half of the worker pool.
///
/// Dropping every clone closes the queues; workers then drain what is
/// buffered and exit.
#[derive(Clone, Debug)]
pub struct WorkQueue {
    shards: Arc<[mpsc::Sender<Reading>]>,
}

impl WorkQueue {
    /// Spawn `workers` tasks (at least one), each with a queue of
    /// `capacity` readings.
    pub fn spawn(
        pipeline: Arc<IngestPipeline>,
        workers: usize,
        capacity: usize,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for shard in 0..workers {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(shard, Arc::clone(&pipeline), rx)));
        }
        info!(workers, capacity, "ingest workers started");

        (
            Self {
                shards: senders.into(),
            },
            handles,
        )
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard index responsible for `device_key`.
    pub fn shard_for(&self, device_key: &DeviceKey) -> usize {
        let mut hasher = DefaultHasher::new();
        device_key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Enqueue a reading, waiting for room if its shard is full.
    pub async fn dispatch(&self, reading: Reading) -> Result<(), QueueClosed> {
        let shard = self.shard_for(&reading.device_key);
        self.shards[shard].send(reading).await.map_err(|_| QueueClosed)
    }
}

async fn run_worker(
    shard: usize,
    pipeline: Arc<IngestPipeline>,
    mut rx: mpsc::Receiver<Reading>,
) {
    debug!(shard, "ingest worker running");
    let mut processed: u64 = 0;
    while let Some(reading) = rx.recv().await {
        let _ = pipeline.process(reading).await;
        processed += 1;
    }
    debug!(shard, processed, "ingest worker drained");
}
