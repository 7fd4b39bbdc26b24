//! Per-viewer connection handle.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hive_core::DeviceKey;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Unique viewer connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ViewerId(String);

impl ViewerId {
    /// Generate a fresh, time-ordered id.
    pub fn new() -> Self {
        Self(format!("viewer_{}", Uuid::now_v7()))
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ViewerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry-side handle for one live viewer.
///
/// The registry pushes pre-encoded frames into a bounded queue drained by
/// the viewer's session task. A frame that does not fit marks the viewer
/// as evicted.
pub struct ViewerConnection {
    /// Connection id.
    pub id: ViewerId,
    /// Device the viewer watches.
    pub device_key: DeviceKey,
    tx: mpsc::Sender<Arc<str>>,
    evicted: CancellationToken,
    dropped_frames: AtomicU64,
    connected_at: Instant,
}

impl ViewerConnection {
    /// Create a connection and the receiving end of its frame queue.
    pub fn new(device_key: DeviceKey, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id: ViewerId::new(),
            device_key,
            tx,
            evicted: CancellationToken::new(),
            dropped_frames: AtomicU64::new(0),
            connected_at: Instant::now(),
        });
        (conn, rx)
    }

    /// Queue a frame without waiting.
    ///
    /// Returns `false` if the queue is full or the session is gone.
    pub fn try_deliver(&self, frame: Arc<str>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Tell the session it has been removed from the registry.
    pub fn evict(&self) {
        self.evicted.cancel();
    }

    /// Whether [`evict`](Self::evict) has been called.
    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }

    /// Resolves once the viewer is evicted.
    pub fn evicted(&self) -> WaitForCancellationFuture<'_> {
        self.evicted.cancelled()
    }

    /// Frames that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for ViewerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewerConnection")
            .field("id", &self.id)
            .field("device_key", &self.device_key)
            .field("evicted", &self.is_evicted())
            .finish_non_exhaustive()
    }
}
