//! # hive-ingest
//!
//! The ingest half of hivewatch: broker messages in, store appends and
//! viewer broadcasts out.
//!
//! - [`payload`]: JSON payload decoding into [`hive_core::Reading`]
//! - [`topic`]: subscription filter matching and device segment extraction
//! - [`pipeline`]: existence check, append, broadcast for one reading
//! - [`workers`]: device-sharded worker pool with bounded queues
//! - [`bridge`]: the MQTT event loop with reconnect backoff
//! - [`stats`]: counters surfaced in the health report

#![deny(unsafe_code)]

pub mod bridge;
pub mod payload;
pub mod pipeline;
pub mod stats;
pub mod topic;
pub mod workers;

pub use bridge::{BridgeConfig, BridgeError, BridgeExit, IngestBridge};
pub use payload::{decode_reading, DecodeError};
pub use pipeline::{IngestOutcome, IngestPipeline};
pub use stats::{IngestStats, IngestStatsSnapshot};
pub use topic::TopicFilter;
pub use workers::{QueueClosed, WorkQueue};
