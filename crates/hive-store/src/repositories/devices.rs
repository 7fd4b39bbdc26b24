//! Device catalog repository for the `devices` table.

use chrono::Utc;
use hive_core::DeviceKey;
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::Result;

/// Device repository.
pub struct DeviceRepo;

impl DeviceRepo {
    /// Whether `device_key` has a catalog row.
    pub fn exists(conn: &Connection, device_key: &DeviceKey) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM devices WHERE device_key = ?1",
                [device_key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a device if absent. Returns whether a row was created.
    pub fn register(
        conn: &Connection,
        device_key: &DeviceKey,
        label: Option<&str>,
    ) -> Result<bool> {
        let inserted = conn.execute(
            "INSERT INTO devices (device_key, label, registered_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(device_key) DO NOTHING",
            params![device_key.as_str(), label, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    /// Number of catalog rows.
    pub fn count(conn: &Connection) -> Result<u64> {
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}
