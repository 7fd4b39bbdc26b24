//! Broker, store, ingest, and live session settings.

use hive_core::retry::BackoffPolicy;
use serde::{Deserialize, Serialize};

/// MQTT broker connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerSettings {
    /// Broker hostname.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Subscription filter covering every device. The single-level wildcard
    /// marks the device key segment.
    pub topic_filter: String,
    /// MQTT keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// Capacity of the client's outgoing request channel.
    pub request_capacity: usize,
    /// Reconnect backoff after a transport failure.
    pub reconnect: BackoffPolicy,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "hivewatch-ingest".to_string(),
            topic_filter: "telemetry/+/readings".to_string(),
            keep_alive_secs: 30,
            request_capacity: 64,
            reconnect: BackoffPolicy::default(),
        }
    }
}

/// Reading store settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "hivewatch.db".to_string(),
            pool_size: 4,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Live viewer session settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Readings replayed to a viewer on connect.
    pub replay_limit: usize,
    /// Seconds without inbound traffic before a keepalive is sent.
    pub idle_timeout_secs: u64,
    /// Outbound frames buffered per viewer before it is evicted.
    pub send_queue_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            replay_limit: 10,
            idle_timeout_secs: 30,
            send_queue_capacity: 256,
        }
    }
}

/// Ingest worker pool settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestSettings {
    /// Worker tasks. Each device key is always handled by the same worker.
    pub workers: usize,
    /// Bounded queue depth per worker.
    pub queue_capacity: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}
