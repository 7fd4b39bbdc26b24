//! `HiveServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use hive_core::{DeviceRegistry, ReadingStore};
use hive_ingest::IngestStats;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::history;
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{run_live_session, SessionContext};
use crate::websocket::subscribers::SubscriberRegistry;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Device catalog.
    pub registry: Arc<dyn DeviceRegistry>,
    /// Reading history.
    pub store: Arc<dyn ReadingStore>,
    /// Live fan-out registry.
    pub subscribers: Arc<SubscriberRegistry>,
    /// Ingest counters for `/health`.
    pub stats: Arc<IngestStats>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
    /// Shared session dependencies.
    pub session_ctx: Arc<SessionContext>,
    /// Live session tasks.
    pub sessions: TaskTracker,
    /// Max inbound WebSocket message size.
    pub max_message_size: usize,
}

/// The hivewatch HTTP server.
pub struct HiveServer {
    config: ServerConfig,
    state: AppState,
}

impl HiveServer {
    /// Create a server over the given collaborators.
    ///
    /// `subscribers` must be the same registry the ingest pipeline
    /// broadcasts into.
    pub fn new(
        config: ServerConfig,
        registry: Arc<dyn DeviceRegistry>,
        store: Arc<dyn ReadingStore>,
        subscribers: Arc<SubscriberRegistry>,
        stats: Arc<IngestStats>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let session_ctx = Arc::new(SessionContext {
            registry: Arc::clone(&registry),
            store: Arc::clone(&store),
            subscribers: Arc::clone(&subscribers),
            replay_limit: config.replay_limit,
            idle_timeout: config.idle_timeout,
            send_queue_capacity: config.send_queue_capacity,
            shutdown: shutdown.viewer_token(),
        });
        let state = AppState {
            registry,
            store,
            subscribers,
            stats,
            shutdown,
            metrics: None,
            start_time: Instant::now(),
            session_ctx,
            sessions: TaskTracker::new(),
            max_message_size: config.max_message_size,
        };
        Self { config, state }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/devices/{device_key}/telemetry", get(ws_handler))
            .route(
                "/api/devices/{device_key}/readings",
                get(history::recent_readings),
            )
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in the background.
    ///
    /// The returned task finishes once the viewer token is cancelled, the
    /// listener has stopped and open sessions have closed (or the shutdown
    /// timeout elapsed).
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "hivewatch server listening");

        let router = self.router();
        let token = self.state.shutdown.viewer_token();
        let sessions = self.state.sessions.clone();
        let timeout = self.config.shutdown_timeout;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
            {
                warn!(error = %e, "server error");
            }

            let _ = sessions.close();
            if tokio::time::timeout(timeout, sessions.wait()).await.is_err() {
                warn!(remaining = sessions.len(), "sessions still open after shutdown timeout");
            }
            info!("hivewatch server stopped");
        });

        Ok((addr, handle))
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// The subscriber registry.
    pub fn subscribers(&self) -> &Arc<SubscriberRegistry> {
        &self.state.subscribers
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let shutting_down = state.shutdown.is_shutting_down();
    let resp = health::health_check(
        state.start_time,
        shutting_down,
        state.subscribers.viewer_count(),
        state.subscribers.devices_watched(),
        state.stats.snapshot(),
    );
    let status = if shutting_down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(resp))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics::render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws/devices/{device_key}/telemetry
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(device_key): Path<String>,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let ctx = Arc::clone(&state.session_ctx);
    let sessions = state.sessions.clone();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            let _ = sessions
                .track_future(run_live_session(socket, device_key, ctx))
                .await;
        })
}
