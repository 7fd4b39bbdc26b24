//! In-process ingest counters.
//!
//! Each recorder bumps both an atomic (snapshotted into the health report)
//! and the matching `metrics` counter.

use std::sync::atomic::{AtomicU64, Ordering};

use hive_core::metrics as names;
use metrics::counter;
use serde::Serialize;

/// Running totals for the ingest path.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    decode_failures: AtomicU64,
    unknown_device: AtomicU64,
    lookup_failures: AtomicU64,
    appended: AtomicU64,
    append_failures: AtomicU64,
    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    /// Publish packets received from the broker.
    pub received: u64,
    /// Payloads dropped by the decoder.
    pub decode_failures: u64,
    /// Readings dropped for an unregistered device.
    pub unknown_device: u64,
    /// Readings dropped because the device lookup failed.
    pub lookup_failures: u64,
    /// Readings persisted.
    pub appended: u64,
    /// Failed persistence attempts.
    pub append_failures: u64,
    /// Broadcast attempts.
    pub broadcasts: u64,
    /// Individual viewer deliveries.
    pub deliveries: u64,
    /// Broker reconnect attempts.
    pub reconnects: u64,
}

impl IngestStats {
    /// A publish packet arrived.
    pub fn record_received(&self) {
        let _ = self.received.fetch_add(1, Ordering::Relaxed);
        counter!(names::INGEST_MESSAGES_TOTAL).increment(1);
    }

    /// A payload failed to decode.
    pub fn record_decode_failure(&self, reason: &'static str) {
        let _ = self.decode_failures.fetch_add(1, Ordering::Relaxed);
        counter!(names::INGEST_DECODE_FAILURES_TOTAL, "reason" => reason).increment(1);
    }

    /// A reading named an unregistered device.
    pub fn record_unknown_device(&self) {
        let _ = self.unknown_device.fetch_add(1, Ordering::Relaxed);
        counter!(names::INGEST_UNKNOWN_DEVICE_TOTAL).increment(1);
    }

    /// The device lookup itself failed.
    pub fn record_lookup_failure(&self) {
        let _ = self.lookup_failures.fetch_add(1, Ordering::Relaxed);
        counter!(names::INGEST_LOOKUP_FAILURES_TOTAL).increment(1);
    }

    /// A store append finished.
    pub fn record_append(&self, error_kind: Option<&'static str>) {
        match error_kind {
            None => {
                let _ = self.appended.fetch_add(1, Ordering::Relaxed);
                counter!(names::STORE_APPENDS_TOTAL).increment(1);
            }
            Some(kind) => {
                let _ = self.append_failures.fetch_add(1, Ordering::Relaxed);
                counter!(names::STORE_APPEND_FAILURES_TOTAL, "kind" => kind).increment(1);
            }
        }
    }

    /// A broadcast reached `viewers` sessions.
    pub fn record_broadcast(&self, viewers: usize) {
        let viewers = viewers as u64;
        let _ = self.broadcasts.fetch_add(1, Ordering::Relaxed);
        let _ = self.deliveries.fetch_add(viewers, Ordering::Relaxed);
        counter!(names::BROADCAST_DELIVERIES_TOTAL).increment(viewers);
    }

    /// The broker connection failed and will be retried.
    pub fn record_reconnect(&self) {
        let _ = self.reconnects.fetch_add(1, Ordering::Relaxed);
        counter!(names::BROKER_RECONNECTS_TOTAL).increment(1);
    }

    /// Copy the current totals.
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            unknown_device: self.unknown_device.load(Ordering::Relaxed),
            lookup_failures: self.lookup_failures.load(Ordering::Relaxed),
            appended: self.appended.load(Ordering::Relaxed),
            append_failures: self.append_failures.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}
