//! # hivewatch
//!
//! Beehive telemetry service binary: wires the MQTT ingest bridge, the
//! `SQLite` reading store, and the live viewer server together.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hive_core::{DeviceKey, DeviceRegistry, ReadingBroadcaster, ReadingStore};
use hive_ingest::{BridgeConfig, IngestBridge, IngestPipeline, IngestStats, WorkQueue};
use hive_server::{HiveServer, ServerConfig, ShutdownTasks, SubscriberRegistry};
use hive_settings::HiveSettings;
use hive_store::{ConnectionConfig, HiveDatabase};
use tracing::{info, warn};

/// Beehive telemetry ingest and live fan-out service.
#[derive(Parser, Debug)]
#[command(name = "hivewatch", about = "Beehive telemetry ingest and live fan-out service")]
struct Cli {
    /// Settings file (defaults to `~/.hivewatch/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// MQTT broker as `host` or `host:port`.
    #[arg(long)]
    broker: Option<String>,

    /// Add a device to the catalog before starting (repeatable).
    #[arg(long = "register-device", value_name = "KEY")]
    register_devices: Vec<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<HiveSettings> {
        let mut settings = match &self.config {
            Some(path) => hive_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => hive_settings::load_settings().context("Failed to load settings")?,
        };
        self.apply_overrides(&mut settings)?;
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut HiveSettings) -> Result<()> {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.db_path {
            settings.store.db_path = path.to_string_lossy().into_owned();
        }
        if let Some(broker) = &self.broker {
            let (host, port) = parse_broker(broker)?;
            settings.broker.host = host;
            if let Some(port) = port {
                settings.broker.port = port;
            }
        }
        Ok(())
    }
}

fn parse_broker(raw: &str) -> Result<(String, Option<u16>)> {
    let (host, port) = match raw.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid broker port in '{raw}'"))?;
            (host, Some(port))
        }
        None => (raw, None),
    };
    if host.is_empty() {
        bail!("Broker host must not be empty");
    }
    Ok((host.to_string(), port))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn bridge_config(settings: &HiveSettings) -> BridgeConfig {
    BridgeConfig {
        host: settings.broker.host.clone(),
        port: settings.broker.port,
        client_id: settings.broker.client_id.clone(),
        topic_filter: settings.broker.topic_filter.clone(),
        keep_alive: Duration::from_secs(settings.broker.keep_alive_secs),
        request_capacity: settings.broker.request_capacity,
        backoff: settings.broker.reconnect.clone(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    hive_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics = match hive_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics recorder not installed");
            None
        }
    };

    // Store and catalog
    let db_path = PathBuf::from(&settings.store.db_path);
    ensure_parent_dir(&db_path)?;
    let db = HiveDatabase::open_file(
        &settings.store.db_path,
        &ConnectionConfig {
            pool_size: settings.store.pool_size,
            busy_timeout_ms: settings.store.busy_timeout_ms,
        },
    )
    .context("Failed to open database")?;

    let catalog = db.devices();
    for raw in &args.register_devices {
        let key = DeviceKey::new(raw.as_str())
            .with_context(|| format!("Invalid device key '{raw}'"))?;
        let created = catalog
            .register_device(&key, None)
            .await
            .with_context(|| format!("Failed to register device '{raw}'"))?;
        info!(device_key = %key, created, "device registered");
    }

    let registry: Arc<dyn DeviceRegistry> = Arc::new(catalog);
    let store: Arc<dyn ReadingStore> = Arc::new(db.readings());
    let subscribers = Arc::new(SubscriberRegistry::new());
    let stats = Arc::new(IngestStats::default());

    // Ingest: broker -> sharded workers -> store + fan-out
    let broadcaster: Arc<dyn ReadingBroadcaster> = subscribers.clone();
    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        broadcaster,
        Arc::clone(&stats),
    ));
    let (queue, workers) =
        WorkQueue::spawn(pipeline, settings.ingest.workers, settings.ingest.queue_capacity);
    let bridge = IngestBridge::new(bridge_config(&settings), queue, Arc::clone(&stats))
        .context("Failed to configure MQTT bridge")?;

    // Viewers
    let config = ServerConfig::from(&settings);
    let shutdown_timeout = config.shutdown_timeout;
    let mut server = HiveServer::new(config, registry, store, subscribers, stats);
    if let Some(handle) = metrics {
        server = server.with_metrics(handle);
    }

    let cancel = server.shutdown().ingest_token();
    let bridge_handle = tokio::spawn(async move {
        let exit = bridge.run(cancel).await;
        info!(?exit, "mqtt bridge stopped");
    });

    let (addr, server_handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    info!(
        "hivewatch listening on http://{addr} (broker {}:{})",
        settings.broker.host, settings.broker.port
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    let tasks = ShutdownTasks {
        bridge: bridge_handle,
        workers,
        server: server_handle,
    };
    if !server.shutdown().drain(tasks, shutdown_timeout).await {
        warn!("forced shutdown with tasks still running");
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["hivewatch"]);
        assert!(cli.config.is_none());
        assert!(cli.host.is_none());
        assert!(cli.register_devices.is_empty());
    }

    #[test]
    fn cli_repeatable_register_device() {
        let cli = Cli::parse_from([
            "hivewatch",
            "--register-device",
            "hive-001",
            "--register-device",
            "hive-002",
        ]);
        assert_eq!(cli.register_devices, vec!["hive-001", "hive-002"]);
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "hivewatch",
            "--host",
            "127.0.0.1",
            "--port",
            "9100",
            "--db-path",
            "/var/lib/hivewatch/readings.db",
            "--broker",
            "mqtt.local:1884",
        ]);
        let mut settings = HiveSettings::default();
        cli.apply_overrides(&mut settings).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.store.db_path, "/var/lib/hivewatch/readings.db");
        assert_eq!(settings.broker.host, "mqtt.local");
        assert_eq!(settings.broker.port, 1884);
    }

    #[test]
    fn broker_without_port_keeps_default_port() {
        let (host, port) = parse_broker("broker.example").unwrap();
        assert_eq!(host, "broker.example");
        assert_eq!(port, None);
    }

    #[test]
    fn broker_rejects_bad_port() {
        assert!(parse_broker("broker:notaport").is_err());
        assert!(parse_broker(":1883").is_err());
    }

    #[test]
    fn bridge_config_from_settings() {
        let settings = HiveSettings::default();
        let cfg = bridge_config(&settings);
        assert_eq!(cfg.port, 1883);
        assert_eq!(cfg.topic_filter, "telemetry/+/readings");
        assert_eq!(cfg.keep_alive, Duration::from_secs(30));
    }

    #[test]
    fn ensure_parent_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("a").join("b").join("hive.db");
        ensure_parent_dir(&db).unwrap();
        assert!(db.parent().unwrap().is_dir());
    }

    #[test]
    fn ensure_parent_dir_bare_filename() {
        ensure_parent_dir(Path::new("hivewatch.db")).unwrap();
    }
}
