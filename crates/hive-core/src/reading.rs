//! The telemetry reading value.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceKey;

/// Fractional-second digits kept on `observed_at`.
///
/// The store keys readings by microsecond timestamps, so live and replayed
/// copies of the same reading must agree at this precision.
pub const TIMESTAMP_PRECISION_DIGITS: u16 = 6;

/// One timestamped telemetry sample from a device.
///
/// Identity for storage is `(device_key, observed_at)`. Metrics a device did
/// not report are `None` and are omitted when serialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Device that produced the sample.
    pub device_key: DeviceKey,
    /// When the device observed the sample (UTC, microsecond precision).
    pub observed_at: DateTime<Utc>,
    /// Brood temperature in degrees Celsius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Relative humidity in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    /// Hive weight in kilograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Sound level in decibels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_level: Option<f64>,
}

impl Reading {
    /// Create a reading with no metrics.
    ///
    /// `observed_at` is truncated to microsecond precision.
    pub fn new(device_key: DeviceKey, observed_at: DateTime<Utc>) -> Self {
        Self {
            device_key,
            observed_at: observed_at.trunc_subsecs(TIMESTAMP_PRECISION_DIGITS),
            temperature: None,
            humidity: None,
            weight: None,
            sound_level: None,
        }
    }

    /// Set the temperature metric.
    #[must_use]
    pub fn with_temperature(mut self, value: Option<f64>) -> Self {
        self.temperature = value;
        self
    }

    /// Set the humidity metric.
    #[must_use]
    pub fn with_humidity(mut self, value: Option<f64>) -> Self {
        self.humidity = value;
        self
    }

    /// Set the weight metric.
    #[must_use]
    pub fn with_weight(mut self, value: Option<f64>) -> Self {
        self.weight = value;
        self
    }

    /// Set the sound level metric.
    #[must_use]
    pub fn with_sound_level(mut self, value: Option<f64>) -> Self {
        self.sound_level = value;
        self
    }

    /// Number of metrics present.
    pub fn metric_count(&self) -> usize {
        [self.temperature, self.humidity, self.weight, self.sound_level]
            .iter()
            .filter(|m| m.is_some())
            .count()
    }
}
