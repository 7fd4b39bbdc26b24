//! End-to-end live session tests against a server bound on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::{SinkExt, StreamExt};
use hive_core::{DeviceKey, Reading, ReadingBroadcaster, ReadingStore};
use hive_ingest::{decode_reading, IngestOutcome, IngestPipeline, IngestStats, WorkQueue};
use hive_server::{HiveServer, ServerConfig, SubscriberRegistry};
use hive_store::HiveDatabase;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    server: HiveServer,
    addr: SocketAddr,
    handle: JoinHandle<()>,
    db: HiveDatabase,
    pipeline: Arc<IngestPipeline>,
}

fn key(s: &str) -> DeviceKey {
    DeviceKey::new(s).unwrap()
}

async fn start(config: ServerConfig, devices: &[&str]) -> Harness {
    let db = HiveDatabase::open_in_memory().unwrap();
    let registry = db.devices();
    for device in devices {
        let _ = registry.register_device(&key(device), None).await.unwrap();
    }

    let subscribers = Arc::new(SubscriberRegistry::new());
    let stats = Arc::new(IngestStats::default());
    let broadcaster: Arc<dyn ReadingBroadcaster> = subscribers.clone();
    let pipeline = Arc::new(IngestPipeline::new(
        Arc::new(registry.clone()),
        Arc::new(db.readings()),
        broadcaster,
        Arc::clone(&stats),
    ));

    let server = HiveServer::new(
        config,
        Arc::new(registry),
        Arc::new(db.readings()),
        subscribers,
        stats,
    );
    let (addr, handle) = server.listen().await.unwrap();

    Harness {
        server,
        addr,
        handle,
        db,
        pipeline,
    }
}

async fn connect(addr: SocketAddr, device: &str) -> Client {
    let url = format!("ws://{addr}/ws/devices/{device}/telemetry");
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Wait until the registry holds `n` viewers for `device`.
async fn wait_for_viewers(server: &HiveServer, device: &str, n: usize) {
    let device = key(device);
    tokio::time::timeout(FRAME_TIMEOUT, async {
        while server.subscribers().viewers_for(&device) != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {n} viewers for {device}"));
}

async fn next_message(ws: &mut Client) -> Message {
    tokio::time::timeout(FRAME_TIMEOUT, ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("websocket error")
}

async fn next_json(ws: &mut Client) -> serde_json::Value {
    match next_message(ws).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn expect_close(ws: &mut Client, code: u16) {
    match next_message(ws).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), code),
        other => panic!("expected close {code}, got {other:?}"),
    }
}

fn reading_at(device: &str, minute: u32, temperature: f64) -> Reading {
    let t = Utc.with_ymd_and_hms(2026, 5, 1, 12, minute, 0).unwrap();
    Reading::new(key(device), t).with_temperature(Some(temperature))
}

#[tokio::test]
async fn empty_history_then_live_reading() {
    let h = start(ServerConfig::default(), &["hive-001"]).await;
    let mut ws = connect(h.addr, "hive-001").await;
    wait_for_viewers(&h.server, "hive-001", 1).await;

    let payload = br#"{"device_key":"hive-001","temperature":34.8,"humidity":61.0,"timestamp":"2026-05-01T12:00:00Z"}"#;
    let reading = decode_reading(payload, Some("hive-001"), Utc::now()).unwrap();
    let outcome = h.pipeline.process(reading).await;
    assert_eq!(
        outcome,
        IngestOutcome::Processed {
            stored: true,
            viewers: 1
        }
    );

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "reading");
    assert_eq!(frame["device_key"], "hive-001");
    assert_eq!(frame["observed_at"], "2026-05-01T12:00:00Z");
    assert_eq!(frame["temperature"], 34.8);
    assert_eq!(frame["humidity"], 61.0);
    assert!(frame.get("weight").is_none());
}

#[tokio::test]
async fn replays_recent_history_oldest_first() {
    let config = ServerConfig {
        replay_limit: 2,
        ..ServerConfig::default()
    };
    let h = start(config, &["hive-001"]).await;
    let store = h.db.readings();
    for (minute, temp) in [(0, 30.0), (1, 31.0), (2, 32.0)] {
        store.append(&reading_at("hive-001", minute, temp)).await.unwrap();
    }

    let mut ws = connect(h.addr, "hive-001").await;
    assert_eq!(next_json(&mut ws).await["temperature"], 31.0);
    assert_eq!(next_json(&mut ws).await["temperature"], 32.0);

    wait_for_viewers(&h.server, "hive-001", 1).await;
    let _ = h.pipeline.process(reading_at("hive-001", 3, 33.0)).await;
    assert_eq!(next_json(&mut ws).await["temperature"], 33.0);
}

#[tokio::test]
async fn unknown_device_is_rejected_without_replay() {
    let h = start(ServerConfig::default(), &["hive-001"]).await;
    h.db.readings()
        .append(&reading_at("hive-999", 0, 30.0))
        .await
        .unwrap();

    let mut ws = connect(h.addr, "hive-999").await;
    expect_close(&mut ws, 1008).await;
    assert_eq!(h.server.subscribers().viewer_count(), 0);
}

#[tokio::test]
async fn idle_viewer_gets_keepalive_and_stays_open() {
    let config = ServerConfig {
        idle_timeout: Duration::from_millis(200),
        ..ServerConfig::default()
    };
    let h = start(config, &["hive-001"]).await;
    let mut ws = connect(h.addr, "hive-001").await;

    let ping = next_json(&mut ws).await;
    assert_eq!(ping["type"], "ping");

    ws.send(Message::text(String::from("hello"))).await.unwrap();
    wait_for_viewers(&h.server, "hive-001", 1).await;
    let _ = h.pipeline.process(reading_at("hive-001", 0, 35.5)).await;

    loop {
        let frame = next_json(&mut ws).await;
        if frame["type"] == "reading" {
            assert_eq!(frame["temperature"], 35.5);
            break;
        }
        assert_eq!(frame["type"], "ping");
    }
}

#[tokio::test]
async fn dropped_viewer_does_not_block_the_others() {
    let h = start(ServerConfig::default(), &["hive-001"]).await;
    let mut a = connect(h.addr, "hive-001").await;
    let b = connect(h.addr, "hive-001").await;
    let mut c = connect(h.addr, "hive-001").await;
    wait_for_viewers(&h.server, "hive-001", 3).await;

    drop(b);
    let _ = h.pipeline.process(reading_at("hive-001", 0, 36.0)).await;

    assert_eq!(next_json(&mut a).await["temperature"], 36.0);
    assert_eq!(next_json(&mut c).await["temperature"], 36.0);
    wait_for_viewers(&h.server, "hive-001", 2).await;
}

#[tokio::test]
async fn viewers_only_see_their_device() {
    let h = start(ServerConfig::default(), &["hive-001", "hive-002"]).await;
    let mut one = connect(h.addr, "hive-001").await;
    let mut two = connect(h.addr, "hive-002").await;
    wait_for_viewers(&h.server, "hive-001", 1).await;
    wait_for_viewers(&h.server, "hive-002", 1).await;

    let _ = h.pipeline.process(reading_at("hive-002", 0, 20.0)).await;
    let _ = h.pipeline.process(reading_at("hive-001", 0, 10.0)).await;

    assert_eq!(next_json(&mut one).await["temperature"], 10.0);
    assert_eq!(next_json(&mut two).await["temperature"], 20.0);
}

#[tokio::test]
async fn worker_pool_preserves_per_device_order() {
    let h = start(ServerConfig::default(), &["hive-001"]).await;
    let mut ws = connect(h.addr, "hive-001").await;
    wait_for_viewers(&h.server, "hive-001", 1).await;

    let (queue, workers) = WorkQueue::spawn(Arc::clone(&h.pipeline), 4, 16);
    for minute in 0..10 {
        queue
            .dispatch(reading_at("hive-001", minute, f64::from(minute)))
            .await
            .unwrap();
    }
    drop(queue);
    for worker in workers {
        worker.await.unwrap();
    }

    for minute in 0..10 {
        assert_eq!(next_json(&mut ws).await["temperature"], f64::from(minute));
    }
}

#[tokio::test]
async fn shutdown_closes_sessions_with_going_away() {
    let h = start(ServerConfig::default(), &["hive-001"]).await;
    let mut ws = connect(h.addr, "hive-001").await;
    wait_for_viewers(&h.server, "hive-001", 1).await;

    h.server.shutdown().shutdown();
    expect_close(&mut ws, 1001).await;

    tokio::time::timeout(FRAME_TIMEOUT, h.handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.server.subscribers().viewer_count(), 0);
}

#[tokio::test]
async fn slow_viewer_is_evicted_with_internal_error() {
    let config = ServerConfig {
        send_queue_capacity: 1,
        ..ServerConfig::default()
    };
    let h = start(config, &["hive-001"]).await;
    let mut ws = connect(h.addr, "hive-001").await;
    wait_for_viewers(&h.server, "hive-001", 1).await;

    // The session task cannot run between these calls, so the second one
    // finds the queue still full.
    let subscribers = h.server.subscribers();
    assert_eq!(subscribers.broadcast(&reading_at("hive-001", 0, 34.0)), 1);
    assert_eq!(subscribers.broadcast(&reading_at("hive-001", 1, 34.5)), 0);

    loop {
        match next_message(&mut ws).await {
            Message::Text(_) => continue,
            Message::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 1011);
                break;
            }
            other => panic!("expected close 1011, got {other:?}"),
        }
    }
    wait_for_viewers(&h.server, "hive-001", 0).await;
    assert_eq!(subscribers.viewer_count(), 0);
}
