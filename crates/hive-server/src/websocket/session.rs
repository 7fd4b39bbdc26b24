//! Live viewer session: admit, replay, forward, close.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, StreamExt};
use hive_core::metrics::{
    WS_KEEPALIVES_TOTAL, WS_SESSIONS_ACTIVE, WS_SESSIONS_REJECTED_TOTAL, WS_SESSIONS_TOTAL,
};
use hive_core::{DeviceKey, DeviceRegistry, ReadingStore};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ViewerConnection;
use super::frames::{ViewerFrame, PING_FRAME};
use super::state::{CloseReason, SessionState};
use super::subscribers::SubscriberRegistry;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Longest a single outbound frame may take before the viewer is dropped.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest the final close frame may take.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything a session needs besides its socket.
pub struct SessionContext {
    /// Device catalog.
    pub registry: Arc<dyn DeviceRegistry>,
    /// Reading history for replay.
    pub store: Arc<dyn ReadingStore>,
    /// Live fan-out registry.
    pub subscribers: Arc<SubscriberRegistry>,
    /// Readings replayed on connect.
    pub replay_limit: usize,
    /// Inbound silence before a keepalive is sent.
    pub idle_timeout: Duration,
    /// Per-viewer outbound queue size.
    pub send_queue_capacity: usize,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
}

/// Registry membership for one viewer. Unregisters on drop, so a session
/// future that is dropped mid-flight still cleans up.
struct Subscription {
    subscribers: Arc<SubscriberRegistry>,
    conn: Arc<ViewerConnection>,
}

impl Subscription {
    fn open(subscribers: &Arc<SubscriberRegistry>, conn: Arc<ViewerConnection>) -> Self {
        subscribers.register(&conn);
        counter!(WS_SESSIONS_TOTAL).increment(1);
        gauge!(WS_SESSIONS_ACTIVE).increment(1.0);
        Self {
            subscribers: Arc::clone(subscribers),
            conn,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self
            .subscribers
            .unregister(&self.conn.device_key, &self.conn.id);
        gauge!(WS_SESSIONS_ACTIVE).decrement(1.0);
    }
}

/// Run a live session for the device named by `raw_key`.
///
/// 1. Rejects unknown devices with a "not found" close
/// 2. Registers for live readings, then replays recent history oldest-first
/// 3. Forwards live readings and sends keepalives while inbound traffic is idle
/// 4. Closes on viewer disconnect, send failure, eviction, or shutdown
#[instrument(skip_all, fields(device_key = %raw_key))]
pub async fn run_live_session(
    socket: WebSocket,
    raw_key: String,
    ctx: Arc<SessionContext>,
) -> CloseReason {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut state = SessionState::Connecting;

    let reason = match admit(&raw_key, &ctx).await {
        Ok(device_key) => {
            let (conn, rx) = ViewerConnection::new(device_key, ctx.send_queue_capacity);
            let _subscription = Subscription::open(&ctx.subscribers, Arc::clone(&conn));
            info!(conn_id = %conn.id, "viewer connected");

            state = state.advance(SessionState::Replaying);
            let reason = match replay(&mut ws_tx, &conn, &ctx).await {
                Ok(count) => {
                    debug!(conn_id = %conn.id, count, "replay sent");
                    state = state.advance(SessionState::Live);
                    live(&mut ws_tx, &mut ws_rx, &conn, rx, &ctx).await
                }
                Err(reason) => reason,
            };
            info!(
                conn_id = %conn.id,
                %reason,
                connected_secs = conn.age().as_secs(),
                dropped_frames = conn.drop_count(),
                "viewer disconnected"
            );
            reason
        }
        Err(reason) => {
            counter!(WS_SESSIONS_REJECTED_TOTAL).increment(1);
            info!(%reason, "viewer rejected");
            reason
        }
    };

    state = state.advance(SessionState::Closed);
    debug!(?state, %reason, "session closed");
    send_close(&mut ws_tx, reason).await;
    reason
}

async fn admit(raw_key: &str, ctx: &SessionContext) -> Result<DeviceKey, CloseReason> {
    let Ok(device_key) = DeviceKey::new(raw_key) else {
        return Err(CloseReason::NotFound);
    };
    match ctx.registry.exists(&device_key).await {
        Ok(true) => Ok(device_key),
        Ok(false) => Err(CloseReason::NotFound),
        Err(e) => {
            warn!(error = %e, "device lookup failed");
            Err(CloseReason::LookupFailed)
        }
    }
}

/// Send the most recent readings oldest-first. A store failure degrades to
/// an empty replay.
async fn replay(
    ws_tx: &mut WsSink,
    conn: &ViewerConnection,
    ctx: &SessionContext,
) -> Result<usize, CloseReason> {
    let mut history = match ctx.store.recent(&conn.device_key, ctx.replay_limit).await {
        Ok(history) => history,
        Err(e) => {
            warn!(error = %e, kind = e.error_kind(), "replay query failed, continuing live");
            Vec::new()
        }
    };
    history.reverse();

    let mut sent = 0;
    for reading in &history {
        let frame = match ViewerFrame::Reading(reading).encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode replay frame");
                continue;
            }
        };
        send_text(ws_tx, &frame, conn, &ctx.shutdown).await?;
        sent += 1;
    }
    Ok(sent)
}

async fn live(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsStream,
    conn: &ViewerConnection,
    mut rx: mpsc::Receiver<Arc<str>>,
    ctx: &SessionContext,
) -> CloseReason {
    let mut deadline = Instant::now() + ctx.idle_timeout;

    loop {
        tokio::select! {
            biased;

            () = ctx.shutdown.cancelled() => return CloseReason::Shutdown,

            () = conn.evicted() => return CloseReason::Evicted,

            frame = rx.recv() => {
                let Some(frame) = frame else {
                    return CloseReason::Evicted;
                };
                if let Err(reason) = send_text(ws_tx, &frame, conn, &ctx.shutdown).await {
                    return reason;
                }
            }

            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => return CloseReason::ViewerClosed,
                Some(Ok(_)) => deadline = Instant::now() + ctx.idle_timeout,
                Some(Err(e)) => {
                    debug!(conn_id = %conn.id, error = %e, "viewer read failed");
                    return CloseReason::ViewerClosed;
                }
            },

            () = tokio::time::sleep_until(deadline) => {
                if let Err(reason) = send_text(ws_tx, PING_FRAME, conn, &ctx.shutdown).await {
                    return reason;
                }
                counter!(WS_KEEPALIVES_TOTAL).increment(1);
                debug!(conn_id = %conn.id, "keepalive sent");
                deadline = Instant::now() + ctx.idle_timeout;
            }
        }
    }
}

/// Send one text frame. Shutdown and eviction interrupt a send that is
/// stuck on a slow socket; a send that outlasts [`SEND_TIMEOUT`] fails.
async fn send_text<S>(
    ws_tx: &mut S,
    text: &str,
    conn: &ViewerConnection,
    shutdown: &CancellationToken,
) -> Result<(), CloseReason>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let message = Message::Text(text.to_owned().into());
    let send = tokio::time::timeout(SEND_TIMEOUT, ws_tx.send(message));
    tokio::select! {
        biased;
        () = shutdown.cancelled() => Err(CloseReason::Shutdown),
        () = conn.evicted() => Err(CloseReason::Evicted),
        sent = send => match sent {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                debug!(conn_id = %conn.id, error = %e, "viewer send failed");
                Err(CloseReason::SendFailed)
            }
            Err(_) => {
                warn!(
                    conn_id = %conn.id,
                    timeout_secs = SEND_TIMEOUT.as_secs(),
                    "viewer send timed out"
                );
                Err(CloseReason::SendFailed)
            }
        },
    }
}

async fn send_close<S>(ws_tx: &mut S, reason: CloseReason)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let Some(code) = reason.close_code() else {
        return;
    };
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason.reason_text()),
    };
    match tokio::time::timeout(CLOSE_TIMEOUT, ws_tx.send(Message::Close(Some(frame)))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "close frame not sent"),
        Err(_) => debug!("close frame timed out"),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;

    /// A socket whose send buffer never drains.
    struct Stalled;

    impl Sink<Message> for Stalled {
        type Error = io::Error;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), io::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Pending
        }
    }

    /// A socket the peer has reset.
    struct Reset;

    impl Sink<Message> for Reset {
        type Error = io::Error;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()))
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), io::Error> {
            Err(io::ErrorKind::ConnectionReset.into())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn viewer() -> Arc<ViewerConnection> {
        ViewerConnection::new(DeviceKey::new("hive-001").unwrap(), 4).0
    }

    #[tokio::test]
    async fn send_reaches_socket() {
        let conn = viewer();
        let mut sent: Vec<Message> = Vec::new();

        send_text(&mut sent, PING_FRAME, &conn, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sent, [Message::Text(PING_FRAME.into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_send_times_out() {
        let conn = viewer();
        let started = Instant::now();

        let result = send_text(&mut Stalled, PING_FRAME, &conn, &CancellationToken::new()).await;

        assert_eq!(result, Err(CloseReason::SendFailed));
        assert!(started.elapsed() >= SEND_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_interrupts_stalled_send() {
        let conn = viewer();
        let evictor = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                conn.evict();
            })
        };
        let started = Instant::now();

        let result = send_text(&mut Stalled, PING_FRAME, &conn, &CancellationToken::new()).await;

        assert_eq!(result, Err(CloseReason::Evicted));
        assert!(started.elapsed() < SEND_TIMEOUT);
        evictor.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_stalled_send() {
        let conn = viewer();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = send_text(&mut Stalled, PING_FRAME, &conn, &shutdown).await;

        assert_eq!(result, Err(CloseReason::Shutdown));
    }

    #[tokio::test]
    async fn reset_socket_fails_send() {
        let conn = viewer();

        let result = send_text(&mut Reset, PING_FRAME, &conn, &CancellationToken::new()).await;

        assert_eq!(result, Err(CloseReason::SendFailed));
    }

    #[tokio::test(start_paused = true)]
    async fn close_frame_gives_up_on_stalled_socket() {
        let started = Instant::now();

        send_close(&mut Stalled, CloseReason::Shutdown).await;

        assert!(started.elapsed() >= CLOSE_TIMEOUT);
        assert!(started.elapsed() < SEND_TIMEOUT);
    }
}
