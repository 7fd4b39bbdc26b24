//! Server configuration.

use std::time::Duration;

use hive_settings::HiveSettings;

/// Default page size for the history endpoint.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
/// Largest page the history endpoint returns.
pub const MAX_HISTORY_LIMIT: usize = 1_000;

/// Configuration for [`HiveServer`](crate::server::HiveServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Readings replayed to a viewer on connect.
    pub replay_limit: usize,
    /// Inbound silence after which a keepalive frame is sent.
    pub idle_timeout: Duration,
    /// Outbound frames buffered per viewer before eviction.
    pub send_queue_capacity: usize,
    /// How long shutdown waits for open sessions to close.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 64 * 1024,
            replay_limit: 10,
            idle_timeout: Duration::from_secs(30),
            send_queue_capacity: 256,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&HiveSettings> for ServerConfig {
    fn from(settings: &HiveSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            replay_limit: settings.session.replay_limit,
            idle_timeout: Duration::from_secs(settings.session.idle_timeout_secs),
            send_queue_capacity: settings.session.send_queue_capacity,
            ..Self::default()
        }
    }
}
