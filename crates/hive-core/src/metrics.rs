//! Metric name constants, shared so every crate records under the same names.

/// MQTT publish packets received (counter).
pub const INGEST_MESSAGES_TOTAL: &str = "ingest_messages_total";
/// Payloads dropped because they failed to decode (counter, labels: reason).
pub const INGEST_DECODE_FAILURES_TOTAL: &str = "ingest_decode_failures_total";
/// Readings dropped because the device is not registered (counter).
pub const INGEST_UNKNOWN_DEVICE_TOTAL: &str = "ingest_unknown_device_total";
/// Device lookups that failed outright (counter).
pub const INGEST_LOOKUP_FAILURES_TOTAL: &str = "ingest_lookup_failures_total";
/// Readings persisted (counter).
pub const STORE_APPENDS_TOTAL: &str = "store_appends_total";
/// Failed persistence attempts (counter, labels: kind).
pub const STORE_APPEND_FAILURES_TOTAL: &str = "store_append_failures_total";
/// Readings handed to viewers (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "broadcast_deliveries_total";
/// Viewers removed after a failed delivery (counter).
pub const BROADCAST_EVICTIONS_TOTAL: &str = "broadcast_evictions_total";
/// Live viewer sessions opened (counter).
pub const WS_SESSIONS_TOTAL: &str = "ws_sessions_total";
/// Live viewer sessions currently open (gauge).
pub const WS_SESSIONS_ACTIVE: &str = "ws_sessions_active";
/// Viewer sessions rejected for an unknown device (counter).
pub const WS_SESSIONS_REJECTED_TOTAL: &str = "ws_sessions_rejected_total";
/// Keepalive frames sent to idle viewers (counter).
pub const WS_KEEPALIVES_TOTAL: &str = "ws_keepalives_total";
/// Broker connection failures followed by a reconnect attempt (counter).
pub const BROKER_RECONNECTS_TOTAL: &str = "broker_reconnects_total";

/// Every metric name, for validation and documentation.
pub const ALL: &[&str] = &[
    INGEST_MESSAGES_TOTAL,
    INGEST_DECODE_FAILURES_TOTAL,
    INGEST_UNKNOWN_DEVICE_TOTAL,
    INGEST_LOOKUP_FAILURES_TOTAL,
    STORE_APPENDS_TOTAL,
    STORE_APPEND_FAILURES_TOTAL,
    BROADCAST_DELIVERIES_TOTAL,
    BROADCAST_EVICTIONS_TOTAL,
    WS_SESSIONS_TOTAL,
    WS_SESSIONS_ACTIVE,
    WS_SESSIONS_REJECTED_TOTAL,
    WS_KEEPALIVES_TOTAL,
    BROKER_RECONNECTS_TOTAL,
];
