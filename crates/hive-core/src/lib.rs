//! # hive-core
//!
//! Foundation types shared by every hivewatch crate:
//!
//! - **Device keys**: [`DeviceKey`], the validated partition key for storage and fan-out
//! - **Readings**: [`Reading`], one immutable timestamped telemetry sample
//! - **Pipeline seams**: [`DeviceRegistry`], [`ReadingStore`], [`ReadingBroadcaster`]
//! - **Errors**: [`StorageError`] reported by store and registry implementations
//! - **Backoff**: [`retry::BackoffPolicy`] for broker reconnects
//! - **Logging**: [`logging::init_subscriber`]
//! - **Metric names**: [`metrics`] constants shared across crates

#![deny(unsafe_code)]

pub mod device;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod reading;
pub mod retry;
pub mod traits;

pub use device::{DeviceKey, InvalidDeviceKey};
pub use errors::StorageError;
pub use reading::Reading;
pub use traits::{DeviceRegistry, ReadingBroadcaster, ReadingStore, StaticDeviceRegistry};
