//! Outbound frames sent to live viewers.

use std::sync::Arc;

use hive_core::Reading;
use serde::Serialize;

/// Pre-encoded [`ViewerFrame::Ping`].
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// A JSON text frame sent to a viewer.
///
/// Serializes as `{"type":"reading", ...reading fields}` or `{"type":"ping"}`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerFrame<'a> {
    /// One telemetry reading, replayed or live.
    Reading(&'a Reading),
    /// Idle keepalive. Viewers ignore it.
    Ping,
}

impl ViewerFrame<'_> {
    /// Serialize to a shareable JSON string.
    pub fn encode(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use hive_core::DeviceKey;

    use super::*;

    #[test]
    fn reading_frame_is_flat() {
        let t = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let r = Reading::new(DeviceKey::new("hive-001").unwrap(), t)
            .with_temperature(Some(34.8))
            .with_humidity(Some(61.0));
        let json: serde_json::Value =
            serde_json::from_str(&ViewerFrame::Reading(&r).encode().unwrap()).unwrap();

        assert_eq!(json["type"], "reading");
        assert_eq!(json["device_key"], "hive-001");
        assert_eq!(json["observed_at"], "2026-05-01T12:00:00Z");
        assert_eq!(json["temperature"], 34.8);
        assert_eq!(json["humidity"], 61.0);
        assert!(json.get("weight").is_none());
    }

    #[test]
    fn ping_frame() {
        assert_eq!(&*ViewerFrame::Ping.encode().unwrap(), PING_FRAME);
    }
}
