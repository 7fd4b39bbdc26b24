//! Per-reading ingest decision: existence check, persist, fan out.

use std::sync::Arc;

use hive_core::{DeviceRegistry, Reading, ReadingBroadcaster, ReadingStore};
use tracing::{debug, instrument, warn};

use crate::stats::IngestStats;

/// What happened to one decoded reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The device exists; the reading was offered to the store and to viewers.
    Processed {
        /// Whether the store append succeeded.
        stored: bool,
        /// Viewers the reading was delivered to.
        viewers: usize,
    },
    /// The device is not registered; the reading was dropped.
    UnknownDevice,
    /// The device lookup failed; the reading was dropped.
    LookupFailed,
}

/// Drives store append and broadcast for decoded readings.
pub struct IngestPipeline {
    registry: Arc<dyn DeviceRegistry>,
    store: Arc<dyn ReadingStore>,
    broadcaster: Arc<dyn ReadingBroadcaster>,
    stats: Arc<IngestStats>,
}

impl IngestPipeline {
    /// Create a pipeline over the given collaborators.
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        store: Arc<dyn ReadingStore>,
        broadcaster: Arc<dyn ReadingBroadcaster>,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            registry,
            store,
            broadcaster,
            stats,
        }
    }

    /// Shared counters.
    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// Process one reading.
    ///
    /// The append is awaited before the broadcast so that a viewer whose
    /// replay query misses a reading is already registered to receive it
    /// live. A failed append does not prevent the broadcast.
    #[instrument(skip_all, fields(device_key = %reading.device_key))]
    pub async fn process(&self, reading: Reading) -> IngestOutcome {
        match self.registry.exists(&reading.device_key).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("unknown device, dropping reading");
                self.stats.record_unknown_device();
                return IngestOutcome::UnknownDevice;
            }
            Err(error) => {
                warn!(%error, "device lookup failed, dropping reading");
                self.stats.record_lookup_failure();
                return IngestOutcome::LookupFailed;
            }
        }

        let stored = match self.store.append(&reading).await {
            Ok(()) => {
                self.stats.record_append(None);
                true
            }
            Err(error) => {
                warn!(%error, kind = error.error_kind(), "failed to persist reading");
                self.stats.record_append(Some(error.error_kind()));
                false
            }
        };

        let viewers = self.broadcaster.broadcast(&reading);
        self.stats.record_broadcast(viewers);
        debug!(stored, viewers, "reading processed");

        IngestOutcome::Processed { stored, viewers }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use hive_core::{DeviceKey, StorageError};
    use parking_lot::Mutex;

    use super::*;

    /// Store that records appends and can be switched to fail.
    #[derive(Default)]
    pub struct RecordingStore {
        pub appended: Mutex<Vec<Reading>>,
        pub fail: AtomicBool,
    }

    #[async_trait]
    impl ReadingStore for RecordingStore {
        async fn append(&self, reading: &Reading) -> Result<(), StorageError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("disk full".into()));
            }
            self.appended.lock().push(reading.clone());
            Ok(())
        }

        async fn recent(
            &self,
            device_key: &DeviceKey,
            limit: usize,
        ) -> Result<Vec<Reading>, StorageError> {
            let all = self.appended.lock();
            Ok(all
                .iter()
                .rev()
                .filter(|r| &r.device_key == device_key)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    /// Broadcaster that records every reading and reports a fixed viewer count.
    #[derive(Default)]
    pub struct RecordingBroadcaster {
        pub seen: Mutex<Vec<Reading>>,
        pub viewers: usize,
    }

    impl ReadingBroadcaster for RecordingBroadcaster {
        fn broadcast(&self, reading: &Reading) -> usize {
            self.seen.lock().push(reading.clone());
            self.viewers
        }
    }

    /// Registry whose lookups always fail.
    pub struct BrokenRegistry;

    #[async_trait]
    impl DeviceRegistry for BrokenRegistry {
        async fn exists(&self, _: &DeviceKey) -> Result<bool, StorageError> {
            Err(StorageError::Unavailable("catalog offline".into()))
        }
    }
}
