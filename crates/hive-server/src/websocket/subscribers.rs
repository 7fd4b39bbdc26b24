//! Per-device subscriber registry and live fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use hive_core::metrics::BROADCAST_EVICTIONS_TOTAL;
use hive_core::{DeviceKey, Reading, ReadingBroadcaster};
use metrics::counter;
use tracing::{debug, warn};

use super::connection::{ViewerConnection, ViewerId};
use super::frames::ViewerFrame;

/// Maps each device key to the viewers currently watching it.
///
/// Safe for concurrent use from ingest workers and session tasks. Delivery
/// never holds a map shard lock.
#[derive(Default)]
pub struct SubscriberRegistry {
    viewers: DashMap<DeviceKey, HashMap<ViewerId, Arc<ViewerConnection>>>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a viewer under its device key. Registering twice is a no-op.
    pub fn register(&self, conn: &Arc<ViewerConnection>) {
        let _ = self
            .viewers
            .entry(conn.device_key.clone())
            .or_default()
            .entry(conn.id.clone())
            .or_insert_with(|| Arc::clone(conn));
    }

    /// Remove a viewer. Returns `false` if it was not registered.
    pub fn unregister(&self, device_key: &DeviceKey, id: &ViewerId) -> bool {
        let removed = match self.viewers.get_mut(device_key) {
            Some(mut set) => set.remove(id).is_some(),
            None => return false,
        };
        let _ = self.viewers.remove_if(device_key, |_, set| set.is_empty());
        removed
    }

    /// Deliver a pre-encoded frame to every viewer of `device_key`.
    ///
    /// Viewers whose queue rejects the frame are removed and evicted. Returns
    /// the number of successful deliveries.
    pub fn broadcast_frame(&self, device_key: &DeviceKey, frame: &Arc<str>) -> usize {
        let targets: Vec<Arc<ViewerConnection>> = match self.viewers.get(device_key) {
            Some(set) => set.values().cloned().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for conn in targets {
            if conn.try_deliver(Arc::clone(frame)) {
                delivered += 1;
            } else {
                let _ = self.unregister(device_key, &conn.id);
                conn.evict();
                counter!(BROADCAST_EVICTIONS_TOTAL).increment(1);
                warn!(
                    device_key = %device_key,
                    conn_id = %conn.id,
                    dropped = conn.drop_count(),
                    "viewer queue rejected frame, evicting"
                );
            }
        }

        delivered
    }

    /// Total registered viewers across all devices.
    pub fn viewer_count(&self) -> usize {
        self.viewers.iter().map(|entry| entry.value().len()).sum()
    }

    /// Devices with at least one viewer.
    pub fn devices_watched(&self) -> usize {
        self.viewers.len()
    }

    /// Viewers registered for one device.
    pub fn viewers_for(&self, device_key: &DeviceKey) -> usize {
        self.viewers.get(device_key).map_or(0, |set| set.len())
    }

    /// Whether a specific viewer is registered.
    pub fn contains(&self, device_key: &DeviceKey, id: &ViewerId) -> bool {
        self.viewers
            .get(device_key)
            .is_some_and(|set| set.contains_key(id))
    }
}

impl ReadingBroadcaster for SubscriberRegistry {
    fn broadcast(&self, reading: &Reading) -> usize {
        if self.viewers_for(&reading.device_key) == 0 {
            return 0;
        }
        let frame = match ViewerFrame::Reading(reading).encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(device_key = %reading.device_key, error = %e, "failed to encode reading frame");
                return 0;
            }
        };
        let delivered = self.broadcast_frame(&reading.device_key, &frame);
        debug!(device_key = %reading.device_key, delivered, "broadcast reading");
        delivered
    }
}
