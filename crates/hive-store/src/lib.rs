//! # hive-store
//!
//! `SQLite` persistence for hivewatch.
//!
//! - [`HiveDatabase`]: opens the pooled database and applies migrations
//! - [`SqliteReadingStore`]: [`hive_core::ReadingStore`] over the `readings` table,
//!   idempotent on `(device_key, observed_at)`
//! - [`SqliteDeviceRegistry`]: [`hive_core::DeviceRegistry`] over the `devices` table

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::ConnectionConfig;
pub use errors::{Result, StoreError};
pub use store::{HiveDatabase, SqliteDeviceRegistry, SqliteReadingStore};
