//! Reading repository: upsert and recent-history queries on `readings`.

use chrono::{DateTime, Utc};
use hive_core::{DeviceKey, Reading};
use rusqlite::{params, Connection, Row};

use crate::errors::{Result, StoreError};

/// Reading repository.
pub struct ReadingRepo;

impl ReadingRepo {
    /// Insert a reading, replacing any row with the same
    /// `(device_key, observed_at)`.
    pub fn upsert(conn: &Connection, reading: &Reading) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO readings (device_key, observed_at_us, temperature, humidity,
                 weight, sound_level, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(device_key, observed_at_us) DO UPDATE SET
                 temperature = excluded.temperature,
                 humidity    = excluded.humidity,
                 weight      = excluded.weight,
                 sound_level = excluded.sound_level,
                 received_at = excluded.received_at",
            params![
                reading.device_key.as_str(),
                reading.observed_at.timestamp_micros(),
                reading.temperature,
                reading.humidity,
                reading.weight,
                reading.sound_level,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Up to `limit` readings for `device_key`, newest first.
    pub fn recent(
        conn: &Connection,
        device_key: &DeviceKey,
        limit: usize,
    ) -> Result<Vec<Reading>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare_cached(
            "SELECT device_key, observed_at_us, temperature, humidity, weight, sound_level
             FROM readings
             WHERE device_key = ?1
             ORDER BY observed_at_us DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![device_key.as_str(), limit], RawReading::from_row)?;

        let mut readings = Vec::new();
        for raw in rows {
            readings.push(raw?.into_reading()?);
        }
        Ok(readings)
    }

    /// Number of stored readings for `device_key`.
    pub fn count(conn: &Connection, device_key: &DeviceKey) -> Result<u64> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM readings WHERE device_key = ?1",
            [device_key.as_str()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

struct RawReading {
    device_key: String,
    observed_at_us: i64,
    temperature: Option<f64>,
    humidity: Option<f64>,
    weight: Option<f64>,
    sound_level: Option<f64>,
}

impl RawReading {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            device_key: row.get(0)?,
            observed_at_us: row.get(1)?,
            temperature: row.get(2)?,
            humidity: row.get(3)?,
            weight: row.get(4)?,
            sound_level: row.get(5)?,
        })
    }

    fn into_reading(self) -> Result<Reading> {
        let key = DeviceKey::new(self.device_key)
            .map_err(|e| StoreError::InvalidKey(e.to_string()))?;
        let observed_at: DateTime<Utc> = DateTime::from_timestamp_micros(self.observed_at_us)
            .ok_or(StoreError::InvalidTimestamp(self.observed_at_us))?;
        Ok(Reading::new(key, observed_at)
            .with_temperature(self.temperature)
            .with_humidity(self.humidity)
            .with_weight(self.weight)
            .with_sound_level(self.sound_level))
    }
}
