//! Ordered service shutdown.
//!
//! Ingest stops first so no reading is accepted that cannot be stored:
//! the bridge is cancelled and awaited, which drops the work queue and lets
//! the workers finish what they hold. Only then are viewers told to go
//! away; the server task closes its session tracker and waits for the
//! 1001 closes to go out.

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tasks owned by a running service, in the order they are stopped.
#[derive(Debug)]
pub struct ShutdownTasks {
    /// The MQTT bridge; stops on the ingest token.
    pub bridge: JoinHandle<()>,
    /// Ingest workers; stop once the bridge drops the work queue.
    pub workers: Vec<JoinHandle<()>>,
    /// The HTTP server; stops on the viewer token and drains sessions.
    pub server: JoinHandle<()>,
}

/// Shutdown signals for the ingest side and the viewer side.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    ingest: CancellationToken,
    viewers: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the MQTT bridge runs under.
    pub fn ingest_token(&self) -> CancellationToken {
        self.ingest.clone()
    }

    /// Token the server and live sessions run under.
    pub fn viewer_token(&self) -> CancellationToken {
        self.viewers.clone()
    }

    /// Signal both sides at once without waiting.
    pub fn shutdown(&self) {
        self.ingest.cancel();
        self.viewers.cancel();
    }

    /// Whether any part of shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.ingest.is_cancelled() || self.viewers.is_cancelled()
    }

    /// Stop `tasks` in order.
    ///
    /// The bridge and workers share one `timeout`; the server gets its own
    /// so viewers are closed even when ingest overruns. Returns `false` if
    /// any stage timed out.
    pub async fn drain(&self, tasks: ShutdownTasks, timeout: Duration) -> bool {
        info!(
            workers = tasks.workers.len(),
            timeout_secs = timeout.as_secs(),
            "draining service"
        );

        self.ingest.cancel();
        let ingest_deadline = Instant::now() + timeout;
        let bridge_done = join_stage("bridge", vec![tasks.bridge], ingest_deadline).await;
        let workers_done = join_stage("workers", tasks.workers, ingest_deadline).await;

        self.viewers.cancel();
        let server_done =
            join_stage("server", vec![tasks.server], Instant::now() + timeout).await;

        bridge_done && workers_done && server_done
    }
}

async fn join_stage(
    stage: &'static str,
    handles: Vec<JoinHandle<()>>,
    deadline: Instant,
) -> bool {
    let count = handles.len();
    match tokio::time::timeout_at(deadline, join_all(handles)).await {
        Ok(results) => {
            for error in results.into_iter().filter_map(Result::err) {
                warn!(stage, %error, "task failed during shutdown");
            }
            info!(stage, count, "stopped");
            true
        }
        Err(_) => {
            warn!(stage, count, "shutdown stage timed out, tasks still running");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn shutdown_cancels_both_sides() {
        let coord = ShutdownCoordinator::new();
        let ingest = coord.ingest_token();
        let viewers = coord.viewer_token();
        assert!(!coord.is_shutting_down());

        coord.shutdown();
        coord.shutdown();
        assert!(ingest.is_cancelled());
        assert!(viewers.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_stops_ingest_before_viewers() {
        let coord = ShutdownCoordinator::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let bridge = {
            let (token, order) = (coord.ingest_token(), order.clone());
            tokio::spawn(async move {
                token.cancelled().await;
                order.lock().push("bridge");
            })
        };
        let workers = (0..2)
            .map(|_| {
                let (token, viewers, order) =
                    (coord.ingest_token(), coord.viewer_token(), order.clone());
                tokio::spawn(async move {
                    token.cancelled().await;
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    assert!(!viewers.is_cancelled());
                    order.lock().push("worker");
                })
            })
            .collect();
        let server = {
            let (token, order) = (coord.viewer_token(), order.clone());
            tokio::spawn(async move {
                token.cancelled().await;
                order.lock().push("server");
            })
        };

        let tasks = ShutdownTasks { bridge, workers, server };
        assert!(coord.drain(tasks, Duration::from_secs(5)).await);
        assert_eq!(*order.lock(), ["bridge", "worker", "worker", "server"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_ingest_still_closes_viewers() {
        let coord = ShutdownCoordinator::new();
        let bridge = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let viewers = coord.viewer_token();
        let server = tokio::spawn(async move { viewers.cancelled().await });

        let tasks = ShutdownTasks {
            bridge,
            workers: Vec::new(),
            server,
        };
        assert!(!coord.drain(tasks, Duration::from_millis(100)).await);
        assert!(coord.viewer_token().is_cancelled());
    }
}
