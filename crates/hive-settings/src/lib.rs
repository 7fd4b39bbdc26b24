//! # hive-settings
//!
//! Layered configuration for hivewatch.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HiveSettings::default()`]
//! 2. **Settings file**: `~/.hivewatch/settings.json` or an explicit path,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `HIVEWATCH_*` and `MQTT_*` overrides
//!
//! The binary applies command-line overrides on top and then calls
//! [`HiveSettings::validate`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
