//! MQTT transport for telemetry ingest and set-point commands
//!
//! A background task drives the `rumqttc` event loop. It (re)subscribes on
//! every CONNACK, hands each inbound publish to the telemetry store and backs
//! off exponentially on connection errors. Transport failures are never
//! fatal; the regulator keeps running on stale telemetry until the broker
//! comes back.
//!
//! While the broker is unreachable the event loop stops draining its request
//! channel, so the client handle only ever uses the non-blocking `try_*`
//! calls. A set point that does not fit is dropped; the next tick sends a
//! fresh one. Subscriptions that do not fit are retried after every event.

use crate::actuator::Actuator;
use crate::config::{MqttConfig, TopicsConfig};
use crate::error::{Result, VoltaicError};
use crate::logging::{StructuredLogger, get_logger};
use crate::telemetry::TelemetryStore;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Capacity of the request channel between client handle and event loop
const REQUEST_CAPACITY: usize = 64;

/// How long `disconnect` waits for the event loop to flush
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Exponential reconnect delay
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    pub fn from_config(config: &MqttConfig) -> Self {
        Self::new(
            Duration::from_millis(config.reconnect_initial_ms),
            Duration::from_millis(config.reconnect_max_ms),
        )
    }

    /// Delay to wait now; doubles the following one up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// MQTT client handle publishing retained set points
pub struct MqttActuator {
    client: AsyncClient,
    set_topic: String,
    connected: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    logger: StructuredLogger,
}

impl MqttActuator {
    /// Connect in the background and start feeding `telemetry`
    pub fn start(mqtt: &MqttConfig, topics: &TopicsConfig, telemetry: Arc<TelemetryStore>) -> Self {
        let logger = get_logger("mqtt");

        let mut options = MqttOptions::new(mqtt.client_id.clone(), mqtt.host.clone(), mqtt.port);
        options.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs.max(5)));
        if let Some(username) = &mqtt.username {
            options.set_credentials(
                username.clone(),
                mqtt.password.clone().unwrap_or_default(),
            );
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let stopping = Arc::new(AtomicBool::new(false));

        logger.info(&format!(
            "Connecting to MQTT broker {}:{} as {}",
            mqtt.host, mqtt.port, mqtt.client_id
        ));

        let event_loop = EventLoopTask {
            client: client.clone(),
            topics: telemetry.topics(),
            telemetry,
            connected: connected.clone(),
            stopping: stopping.clone(),
            backoff: ReconnectBackoff::from_config(mqtt),
            broker: format!("{}:{}", mqtt.host, mqtt.port),
            pending: Vec::new(),
            logger: logger.clone(),
        };
        let handle = tokio::spawn(event_loop.run(eventloop));

        Self {
            client,
            set_topic: topics.set_current.clone(),
            connected,
            stopping,
            event_task: Mutex::new(Some(handle)),
            logger,
        }
    }

    /// Shared flag, true between CONNACK and the next connection error
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Actuator for MqttActuator {
    async fn publish_setpoint(&self, amps: i32) -> Result<()> {
        self.client
            .try_publish(&self.set_topic, QoS::AtMostOnce, true, amps.to_string())
            .map_err(|e| {
                self.logger
                    .warn(&format!("Set point {} A not queued: {}", amps, e));
                VoltaicError::mqtt(format!("Failed to queue set point {} A: {}", amps, e))
            })
    }

    async fn disconnect(&self) -> Result<()> {
        self.stopping.store(true, Ordering::SeqCst);
        let sent = self.client.try_disconnect();

        if let Some(mut handle) = self.event_task.lock().await.take() {
            // Let queued publishes (the final set point) reach the broker
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
                self.logger
                    .warn("MQTT event loop did not stop in time, aborting");
                handle.abort();
            }
        }
        self.connected.store(false, Ordering::Relaxed);
        sent?;
        Ok(())
    }
}

struct EventLoopTask {
    client: AsyncClient,
    topics: Vec<String>,
    telemetry: Arc<TelemetryStore>,
    connected: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    backoff: ReconnectBackoff,
    broker: String,
    pending: Vec<String>,
    logger: StructuredLogger,
}

impl EventLoopTask {
    async fn run(mut self, mut eventloop: EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.connected.store(true, Ordering::Relaxed);
                    self.backoff.reset();
                    self.logger
                        .info(&format!("Connected to MQTT broker {}", self.broker));
                    self.pending = self.topics.clone();
                    self.flush_subscriptions();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    // Failures are logged by the store
                    let _ = self.telemetry.ingest(&publish.topic, &publish.payload);
                    self.flush_subscriptions();
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    self.logger.info("Disconnected from MQTT broker");
                    break;
                }
                Ok(_) => self.flush_subscriptions(),
                Err(e) => {
                    self.connected.store(false, Ordering::Relaxed);
                    self.pending.clear();
                    if self.stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    let delay = self.backoff.next_delay();
                    self.logger.error(&format!(
                        "MQTT connection to {} failed: {}; retrying in {} ms",
                        self.broker,
                        e,
                        delay.as_millis()
                    ));
                    tokio::time::sleep(delay).await;
                }
            }
        }
        self.connected.store(false, Ordering::Relaxed);
    }

    /// Queue outstanding subscriptions, keeping those that do not fit yet
    fn flush_subscriptions(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        // The request channel is drained by this very task, so never await here
        let mut deferred = Vec::new();
        for topic in std::mem::take(&mut self.pending) {
            match self.client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                Ok(()) => self.logger.debug(&format!("Subscribed to {}", topic)),
                Err(e) => {
                    self.logger
                        .debug(&format!("Subscription to {} deferred: {}", topic, e));
                    deferred.push(topic);
                }
            }
        }
        self.pending = deferred;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff =
            ReconnectBackoff::new(Duration::from_millis(1000), Duration::from_millis(5000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(4000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn backoff_from_config() {
        let mut backoff = ReconnectBackoff::from_config(&MqttConfig::default());
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        for _ in 0..20 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    fn offline_config() -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            reconnect_initial_ms: 10,
            reconnect_max_ms: 20,
            ..MqttConfig::default()
        }
    }

    #[tokio::test]
    async fn unreachable_broker_is_not_fatal() {
        let telemetry = Arc::new(TelemetryStore::with_topics(10, &TopicsConfig::default()));
        let actuator = MqttActuator::start(&offline_config(), &TopicsConfig::default(), telemetry);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!actuator.is_connected());
        // Queued locally while offline
        assert!(actuator.publish_setpoint(0).await.is_ok());
        let _ = actuator.disconnect().await;
        assert!(!actuator.is_connected());
    }

    #[tokio::test]
    async fn full_request_channel_drops_set_points_instead_of_blocking() {
        let telemetry = Arc::new(TelemetryStore::with_topics(10, &TopicsConfig::default()));
        let actuator = Arc::new(MqttActuator::start(
            &offline_config(),
            &TopicsConfig::default(),
            telemetry,
        ));

        let publishes = async {
            let mut rejected = 0;
            for amps in 0..(REQUEST_CAPACITY as i32 * 2) {
                if actuator.publish_setpoint(amps % 17).await.is_err() {
                    rejected += 1;
                }
            }
            rejected
        };
        let rejected = tokio::time::timeout(Duration::from_secs(3), publishes)
            .await
            .expect("publishing must not block while offline");
        assert!(rejected > 0);

        let lifecycle = crate::lifecycle::Lifecycle::new(actuator.clone());
        let released = tokio::time::timeout(Duration::from_secs(5), lifecycle.release())
            .await
            .expect("release must finish while offline");
        assert!(released);
        assert!(!actuator.is_connected());
    }

    #[tokio::test]
    async fn subscriptions_that_do_not_fit_are_retried() {
        let topics = TopicsConfig::default();
        let telemetry = Arc::new(TelemetryStore::with_topics(10, &topics));
        let (client, _eventloop) = AsyncClient::new(MqttOptions::new("t", "127.0.0.1", 1), 1);
        let mut task = EventLoopTask {
            client,
            topics: telemetry.topics(),
            telemetry,
            connected: Arc::new(AtomicBool::new(true)),
            stopping: Arc::new(AtomicBool::new(false)),
            backoff: ReconnectBackoff::from_config(&MqttConfig::default()),
            broker: "127.0.0.1:1".to_string(),
            pending: Vec::new(),
            logger: get_logger("mqtt"),
        };

        task.pending = task.topics.clone();
        task.flush_subscriptions();
        // One slot in the channel: the rest stay pending, in order
        assert_eq!(task.pending, task.topics[1..].to_vec());

        task.flush_subscriptions();
        assert_eq!(task.pending.len(), task.topics.len() - 1);
    }
}
