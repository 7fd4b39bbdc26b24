//! Async store handles over the blocking `SQLite` repositories.
//!
//! Every query runs on the blocking thread pool with its own pooled
//! connection, so concurrent appends from different ingest workers never
//! share a connection.

use hive_core::{DeviceKey, DeviceRegistry, Reading, ReadingStore, StorageError};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::connection::{self, ConnectionConfig, ConnectionPool};
use crate::errors::{Result, StoreError};
use crate::migrations::run_migrations;
use crate::repositories::{DeviceRepo, ReadingRepo};

/// An opened, migrated database.
#[derive(Clone)]
pub struct HiveDatabase {
    pool: ConnectionPool,
}

impl HiveDatabase {
    /// Open (or create) a file-backed database and apply pending migrations.
    pub fn open_file(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        let db = Self::migrate(pool)?;
        info!(path, pool_size = config.pool_size, "reading store opened");
        Ok(db)
    }

    /// Open a private in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::migrate(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    fn migrate(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let applied = run_migrations(&conn)?;
        debug!(applied, "schema up to date");
        drop(conn);
        Ok(Self { pool })
    }

    /// Reading store handle sharing this database's pool.
    pub fn readings(&self) -> SqliteReadingStore {
        SqliteReadingStore {
            pool: self.pool.clone(),
        }
    }

    /// Device registry handle sharing this database's pool.
    pub fn devices(&self) -> SqliteDeviceRegistry {
        SqliteDeviceRegistry {
            pool: self.pool.clone(),
        }
    }
}

/// Run `f` against a pooled connection on the blocking thread pool.
async fn with_conn<T, F>(pool: &ConnectionPool, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        f(&conn)
    })
    .await
    .map_err(|e| StoreError::Join(e.to_string()))?
}

/// [`ReadingStore`] backed by the `readings` table.
#[derive(Clone)]
pub struct SqliteReadingStore {
    pool: ConnectionPool,
}

impl SqliteReadingStore {
    /// Number of stored readings for a device.
    pub async fn count(&self, device_key: &DeviceKey) -> Result<u64> {
        let key = device_key.clone();
        with_conn(&self.pool, move |conn| ReadingRepo::count(conn, &key)).await
    }
}

#[async_trait::async_trait]
impl ReadingStore for SqliteReadingStore {
    async fn append(&self, reading: &Reading) -> std::result::Result<(), StorageError> {
        let reading = reading.clone();
        with_conn(&self.pool, move |conn| ReadingRepo::upsert(conn, &reading))
            .await
            .map_err(StorageError::from)
    }

    async fn recent(
        &self,
        device_key: &DeviceKey,
        limit: usize,
    ) -> std::result::Result<Vec<Reading>, StorageError> {
        let key = device_key.clone();
        with_conn(&self.pool, move |conn| ReadingRepo::recent(conn, &key, limit))
            .await
            .map_err(StorageError::from)
    }
}

/// [`DeviceRegistry`] backed by the `devices` table.
///
/// Lookups are never cached: every ingest decision sees the current catalog.
#[derive(Clone)]
pub struct SqliteDeviceRegistry {
    pool: ConnectionPool,
}

impl SqliteDeviceRegistry {
    /// Add a device to the catalog. Returns whether it was newly created.
    pub async fn register_device(
        &self,
        device_key: &DeviceKey,
        label: Option<&str>,
    ) -> Result<bool> {
        let key = device_key.clone();
        let label = label.map(str::to_owned);
        with_conn(&self.pool, move |conn| {
            DeviceRepo::register(conn, &key, label.as_deref())
        })
        .await
    }

    /// Number of catalog entries.
    pub async fn device_count(&self) -> Result<u64> {
        with_conn(&self.pool, DeviceRepo::count).await
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for SqliteDeviceRegistry {
    async fn exists(&self, device_key: &DeviceKey) -> std::result::Result<bool, StorageError> {
        let key = device_key.clone();
        with_conn(&self.pool, move |conn| DeviceRepo::exists(conn, &key))
            .await
            .map_err(StorageError::from)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn key(s: &str) -> DeviceKey {
        DeviceKey::new(s).unwrap()
    }

    fn file_db(dir: &tempfile::TempDir) -> HiveDatabase {
        let path = dir.path().join("hivewatch.db");
        HiveDatabase::open_file(path.to_str().unwrap(), &ConnectionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn append_and_recent_through_trait() {
        let db = HiveDatabase::open_in_memory().unwrap();
        let store = db.readings();
        let t = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let r = Reading::new(key("hive-001"), t).with_temperature(Some(34.8));

        store.append(&r).await.unwrap();
        store.append(&r).await.unwrap();

        assert_eq!(store.count(&key("hive-001")).await.unwrap(), 1);
        assert_eq!(store.recent(&key("hive-001"), 10).await.unwrap(), vec![r]);
    }

    #[tokio::test]
    async fn registry_lookup() {
        let db = HiveDatabase::open_in_memory().unwrap();
        let devices = db.devices();
        assert!(!devices.exists(&key("hive-001")).await.unwrap());
        assert!(devices.register_device(&key("hive-001"), None).await.unwrap());
        assert!(devices.exists(&key("hive-001")).await.unwrap());
        assert_eq!(devices.device_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_on_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(file_db(&dir).readings());
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();

        let mut handles = Vec::new();
        for d in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let k = key(&format!("hive-{d:03}"));
                for i in 0..25 {
                    let r = Reading::new(k.clone(), t0 + Duration::seconds(i))
                        .with_weight(Some(40.0));
                    store.append(&r).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        for d in 0..4 {
            let k = key(&format!("hive-{d:03}"));
            assert_eq!(store.count(&k).await.unwrap(), 25);
            let recent = store.recent(&k, 10).await.unwrap();
            assert_eq!(recent.len(), 10);
            assert!(recent.windows(2).all(|w| w[0].observed_at > w[1].observed_at));
        }
    }

    #[tokio::test]
    async fn reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let t = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        {
            let db = file_db(&dir);
            db.devices().register_device(&key("hive-001"), None).await.unwrap();
            db.readings().append(&Reading::new(key("hive-001"), t)).await.unwrap();
        }
        let db = file_db(&dir);
        assert!(db.devices().exists(&key("hive-001")).await.unwrap());
        assert_eq!(db.readings().recent(&key("hive-001"), 5).await.unwrap().len(), 1);
    }
}
