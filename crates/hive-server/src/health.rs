//! `/health` endpoint.

use std::time::Instant;

use hive_ingest::IngestStatsSnapshot;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while running, `"shutting_down"` once shutdown has begun.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open live viewer sessions.
    pub viewers: usize,
    /// Devices with at least one viewer.
    pub devices_watched: usize,
    /// Ingest counters.
    pub ingest: IngestStatsSnapshot,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    shutting_down: bool,
    viewers: usize,
    devices_watched: usize,
    ingest: IngestStatsSnapshot,
) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        viewers,
        devices_watched,
        ingest,
    }
}
