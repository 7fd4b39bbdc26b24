//! # hive-server
//!
//! Axum HTTP + WebSocket server for live hive telemetry.
//!
//! - **Live sessions**: `GET /ws/devices/{device_key}/telemetry` replays recent
//!   readings, then forwards live ones from the [`SubscriberRegistry`]
//! - **History**: `GET /api/devices/{device_key}/readings?limit=N`
//! - **Health**: `GET /health` with viewer and ingest counters
//! - **Metrics**: `GET /metrics` in Prometheus text format
//! - **Shutdown**: [`ShutdownCoordinator`] stops ingest, then closes sessions
//!   with code 1001

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod history;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, HiveServer};
pub use shutdown::{ShutdownCoordinator, ShutdownTasks};
pub use websocket::state::CloseReason;
pub use websocket::subscribers::SubscriberRegistry;
