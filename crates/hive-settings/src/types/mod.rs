//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the fields it changes.

mod pipeline;
mod server;

pub use pipeline::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Largest replay window a viewer may be sent on connect.
pub const MAX_REPLAY_LIMIT: usize = 1_000;

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "broker": { "host": "mqtt.local", "topicFilter": "beehive/+/telemetry" },
///   "session": { "replayLimit": 20 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HiveSettings {
    /// HTTP/WebSocket listener.
    pub server: ServerSettings,
    /// MQTT broker connection.
    pub broker: BrokerSettings,
    /// Reading store.
    pub store: StoreSettings,
    /// Live viewer sessions.
    pub session: SessionSettings,
    /// Ingest worker pool.
    pub ingest: IngestSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl HiveSettings {
    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: impl Into<String>) -> Result<()> {
            Err(SettingsError::InvalidValue(msg.into()))
        }

        if self.ingest.workers == 0 {
            return invalid("ingest.workers must be > 0");
        }
        if self.ingest.queue_capacity == 0 {
            return invalid("ingest.queueCapacity must be > 0");
        }
        if self.session.replay_limit == 0 || self.session.replay_limit > MAX_REPLAY_LIMIT {
            return invalid(format!(
                "session.replayLimit must be in 1..={MAX_REPLAY_LIMIT}, got {}",
                self.session.replay_limit
            ));
        }
        if self.session.idle_timeout_secs == 0 {
            return invalid("session.idleTimeoutSecs must be > 0");
        }
        if self.session.send_queue_capacity == 0 {
            return invalid("session.sendQueueCapacity must be > 0");
        }
        if self.store.pool_size == 0 {
            return invalid("store.poolSize must be > 0");
        }
        if self.store.db_path.trim().is_empty() {
            return invalid("store.dbPath must not be empty");
        }
        if self.broker.topic_filter.split('/').filter(|l| *l == "+").count() != 1 {
            return invalid(format!(
                "broker.topicFilter must contain exactly one '+' level, got {:?}",
                self.broker.topic_filter
            ));
        }
        if self.broker.topic_filter.contains('#') {
            return invalid("broker.topicFilter must not contain '#'");
        }
        if self.broker.keep_alive_secs < 5 {
            return invalid("broker.keepAliveSecs must be >= 5");
        }
        if self.broker.reconnect.base_delay_ms > self.broker.reconnect.max_delay_ms {
            return invalid("broker.reconnect.baseDelayMs must not exceed maxDelayMs");
        }
        Ok(())
    }
}
