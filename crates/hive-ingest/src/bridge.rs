//! Broker connection loop.
//!
//! Polls the MQTT event loop, (re)subscribes on every `ConnAck`, decodes
//! publishes, and hands readings to the [`WorkQueue`]. Transport errors are
//! never fatal: the loop sleeps for a jittered backoff and polls again, which
//! makes the client reconnect.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hive_core::retry::BackoffPolicy;
use hive_core::Reading;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::payload::decode_reading;
use crate::stats::IngestStats;
use crate::topic::{InvalidTopicFilter, TopicFilter};
use crate::workers::{QueueClosed, WorkQueue};

/// How long a shutdown waits for the DISCONNECT packet to be written.
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that stop the bridge from starting.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The configured subscription filter is unusable.
    #[error(transparent)]
    InvalidFilter(#[from] InvalidTopicFilter),
}

/// Broker connection parameters.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Broker hostname.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Subscription filter with a single `+` device level.
    pub topic_filter: String,
    /// MQTT keep-alive interval.
    pub keep_alive: Duration,
    /// Capacity of the client's outgoing request channel.
    pub request_capacity: usize,
    /// Reconnect backoff.
    pub backoff: BackoffPolicy,
}

/// Why the bridge loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeExit {
    /// Shutdown was requested.
    Cancelled,
    /// The worker pool went away.
    QueueClosed,
}

/// Failed connection attempts since the last `ConnAck`.
#[derive(Debug)]
struct Reconnects {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Reconnects {
    fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    fn connected(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next attempt.
    fn next_delay(&mut self) -> (u32, Duration) {
        let attempt = self.attempt;
        self.attempt = self.attempt.saturating_add(1);
        (attempt, self.policy.delay(attempt))
    }
}

/// MQTT ingest bridge.
pub struct IngestBridge {
    config: BridgeConfig,
    filter: TopicFilter,
    queue: WorkQueue,
    stats: Arc<IngestStats>,
}

impl IngestBridge {
    /// Validate the filter and build a bridge feeding `queue`.
    pub fn new(
        config: BridgeConfig,
        queue: WorkQueue,
        stats: Arc<IngestStats>,
    ) -> Result<Self, BridgeError> {
        let filter = TopicFilter::parse(&config.topic_filter)?;
        Ok(Self {
            config,
            filter,
            queue,
            stats,
        })
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        let _ = opts.set_keep_alive(self.config.keep_alive);
        let _ = opts.set_clean_session(true);
        opts
    }

    /// Run until `cancel` fires or the worker pool closes.
    ///
    /// Consumes the bridge; the work queue is dropped on return, which lets
    /// the workers drain and exit.
    #[instrument(skip_all, fields(host = %self.config.host, port = self.config.port))]
    pub async fn run(self, cancel: CancellationToken) -> BridgeExit {
        let (client, mut eventloop) =
            AsyncClient::new(self.mqtt_options(), self.config.request_capacity.max(1));
        info!(filter = self.filter.as_str(), "ingest bridge starting");

        let mut reconnects = Reconnects::new(self.config.backoff.clone());
        let mut connected = false;
        let exit = loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break BridgeExit::Cancelled,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected = true;
                    reconnects.connected();
                    self.subscribe(&client);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if self.on_publish(&publish).await.is_err() {
                        break BridgeExit::QueueClosed;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    connected = false;
                    if !self.back_off(&error, &mut reconnects, &cancel).await {
                        break BridgeExit::Cancelled;
                    }
                }
            }
        };

        if connected {
            disconnect(&client, &mut eventloop).await;
        }
        info!(?exit, "ingest bridge stopped");
        exit
    }

    fn subscribe(&self, client: &AsyncClient) {
        match client.try_subscribe(self.filter.as_str(), QoS::AtLeastOnce) {
            Ok(()) => info!(filter = self.filter.as_str(), "subscribed"),
            Err(error) => warn!(%error, "subscribe request failed"),
        }
    }

    /// Sleep out the backoff for a transport failure. Returns `false` if
    /// cancelled while waiting.
    async fn back_off(
        &self,
        error: &ConnectionError,
        reconnects: &mut Reconnects,
        cancel: &CancellationToken,
    ) -> bool {
        let (attempt, delay) = reconnects.next_delay();
        self.stats.record_reconnect();
        warn!(
            %error,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "broker connection failed, retrying"
        );
        tokio::select! {
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Decode one publish and enqueue it. Decode failures are logged and
    /// counted; only a closed queue is an error.
    pub async fn on_publish(&self, publish: &Publish) -> Result<(), QueueClosed> {
        self.stats.record_received();
        match self.decode(publish) {
            Some(reading) => self.queue.dispatch(reading).await,
            None => Ok(()),
        }
    }

    fn decode(&self, publish: &Publish) -> Option<Reading> {
        let topic_key = self.filter.device_segment(&publish.topic);
        match decode_reading(&publish.payload, topic_key, Utc::now()) {
            Ok(reading) => Some(reading),
            Err(error) => {
                warn!(
                    topic = %publish.topic,
                    %error,
                    reason = error.reason(),
                    "dropping undecodable payload"
                );
                self.stats.record_decode_failure(error.reason());
                None
            }
        }
    }
}

/// Queue a DISCONNECT and keep polling until it has been written, so the
/// broker sees a clean close instead of a dropped socket.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(error) = client.try_disconnect() {
        warn!(%error, "disconnect request not queued");
        return;
    }

    let flush = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                Ok(_) => {}
                Err(error) => return Err(error),
            }
        }
    };
    match tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, flush).await {
        Ok(Ok(())) => debug!("disconnect sent to broker"),
        Ok(Err(error)) => warn!(%error, "connection failed before disconnect was sent"),
        Err(_) => warn!(
            timeout_ms = DISCONNECT_FLUSH_TIMEOUT.as_millis() as u64,
            "disconnect not flushed before timeout"
        ),
    }
}
