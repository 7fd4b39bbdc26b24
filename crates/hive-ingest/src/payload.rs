//! Inbound telemetry payload decoding.
//!
//! Payloads are JSON objects:
//!
//! ```json
//! {"device_key": "hive-001", "timestamp": "2026-05-01T12:00:00Z",
//!  "temperature": 34.8, "humidity": 61.0, "weight": 45.2, "sound_level": 52.1}
//! ```
//!
//! `device_id` is accepted in place of `device_key`. Every metric is optional
//! but, when present and non-null, must be a JSON number.

use chrono::{DateTime, NaiveDateTime, Utc};
use hive_core::{DeviceKey, InvalidDeviceKey, Reading};
use serde_json::{Map, Value};
use thiserror::Error;

const KEY_FIELDS: [&str; 2] = ["device_key", "device_id"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Why a payload was dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not valid JSON.
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Payload is JSON but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,
    /// Neither `device_key` nor `device_id` is present.
    #[error("missing device_key")]
    MissingDeviceKey,
    /// The device key is present but invalid.
    #[error("invalid device key: {0}")]
    InvalidDeviceKey(#[from] InvalidDeviceKey),
    /// A metric field holds something other than a number or null.
    #[error("metric {field} is not numeric")]
    NonNumericMetric {
        /// The metric field name.
        field: &'static str,
    },
    /// `timestamp` is present but unparseable.
    #[error("unparseable timestamp {0:?}")]
    BadTimestamp(String),
    /// The topic's device segment disagrees with the payload's key.
    #[error("topic device {topic_key:?} does not match payload device {payload_key:?}")]
    TopicMismatch {
        /// Device segment taken from the topic.
        topic_key: String,
        /// Device key taken from the payload.
        payload_key: String,
    },
}

impl DecodeError {
    /// Short label for the failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) | Self::NotAnObject => "malformed",
            Self::MissingDeviceKey | Self::InvalidDeviceKey(_) => "device_key",
            Self::NonNumericMetric { .. } => "non_numeric_metric",
            Self::BadTimestamp(_) => "timestamp",
            Self::TopicMismatch { .. } => "topic_mismatch",
        }
    }
}

/// Decode one payload into a [`Reading`].
///
/// `topic_key` is the device segment of the topic the payload arrived on, if
/// any. `received_at` stands in for an absent or null `timestamp`.
pub fn decode_reading(
    payload: &[u8],
    topic_key: Option<&str>,
    received_at: DateTime<Utc>,
) -> Result<Reading, DecodeError> {
    let value: Value = serde_json::from_slice(payload)?;
    let Value::Object(obj) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let raw_key = KEY_FIELDS
        .iter()
        .find_map(|f| obj.get(*f).and_then(Value::as_str))
        .ok_or(DecodeError::MissingDeviceKey)?;
    if let Some(topic_key) = topic_key {
        if topic_key != raw_key {
            return Err(DecodeError::TopicMismatch {
                topic_key: topic_key.to_owned(),
                payload_key: raw_key.to_owned(),
            });
        }
    }
    let device_key = DeviceKey::new(raw_key)?;

    let observed_at = match obj.get("timestamp") {
        None | Some(Value::Null) => received_at,
        Some(Value::String(s)) => parse_timestamp(s)?,
        Some(other) => return Err(DecodeError::BadTimestamp(other.to_string())),
    };

    Ok(Reading::new(device_key, observed_at)
        .with_temperature(metric(&obj, "temperature")?)
        .with_humidity(metric(&obj, "humidity")?)
        .with_weight(metric(&obj, "weight")?)
        .with_sound_level(metric(&obj, "sound_level")?))
}

fn metric(obj: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or(DecodeError::NonNumericMetric { field }),
        Some(_) => Err(DecodeError::NonNumericMetric { field }),
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DecodeError::BadTimestamp(raw.to_owned()))
}
