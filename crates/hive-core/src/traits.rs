//! Seams between the ingest pipeline, the store, and the fan-out registry.
//!
//! The ingest workers and live sessions only ever see these traits, so tests
//! can swap in failing or recording implementations.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::device::DeviceKey;
use crate::errors::StorageError;
use crate::reading::Reading;

/// Read-only device catalog lookup.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Whether `device_key` is a registered device.
    async fn exists(&self, device_key: &DeviceKey) -> Result<bool, StorageError>;
}

/// Durable, time-ordered reading storage.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persist a reading. A reading with the same `(device_key, observed_at)`
    /// replaces the stored one.
    async fn append(&self, reading: &Reading) -> Result<(), StorageError>;

    /// The most recent `limit` readings for `device_key`, newest first.
    ///
    /// Returns an empty vector when the device has no history.
    async fn recent(
        &self,
        device_key: &DeviceKey,
        limit: usize,
    ) -> Result<Vec<Reading>, StorageError>;
}

/// Fan-out of freshly ingested readings to live viewers.
pub trait ReadingBroadcaster: Send + Sync {
    /// Hand `reading` to every viewer watching its device.
    ///
    /// Returns the number of viewers it was delivered to. Delivery failures
    /// are handled inside the broadcaster and never surface to the caller.
    fn broadcast(&self, reading: &Reading) -> usize;
}

/// In-memory [`DeviceRegistry`] over a fixed set of keys.
#[derive(Debug, Default)]
pub struct StaticDeviceRegistry {
    devices: RwLock<HashSet<DeviceKey>>,
}

impl StaticDeviceRegistry {
    /// Create a registry containing `devices`.
    pub fn new(devices: impl IntoIterator<Item = DeviceKey>) -> Self {
        Self {
            devices: RwLock::new(devices.into_iter().collect()),
        }
    }

    /// Add a device. Returns `false` if it was already present.
    pub fn add(&self, device_key: DeviceKey) -> bool {
        self.devices.write().insert(device_key)
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Whether no devices are known.
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

#[async_trait]
impl DeviceRegistry for StaticDeviceRegistry {
    async fn exists(&self, device_key: &DeviceKey) -> Result<bool, StorageError> {
        Ok(self.devices.read().contains(device_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> DeviceKey {
        DeviceKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn static_registry_lookup() {
        let reg = StaticDeviceRegistry::new([key("hive-001")]);
        assert!(reg.exists(&key("hive-001")).await.unwrap());
        assert!(!reg.exists(&key("hive-999")).await.unwrap());
    }

    #[tokio::test]
    async fn static_registry_add() {
        let reg = StaticDeviceRegistry::default();
        assert!(reg.is_empty());
        assert!(reg.add(key("hive-002")));
        assert!(!reg.add(key("hive-002")));
        assert_eq!(reg.len(), 1);
        assert!(reg.exists(&key("hive-002")).await.unwrap());
    }
}
