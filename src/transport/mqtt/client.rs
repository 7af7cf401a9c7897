//! Impure I/O operations for the MQTT publisher
//!
//! This module owns the rumqttc client and the background task that drives
//! its event loop. Publishing only enqueues a request for that task, so a
//! slow or unreachable broker never blocks the BLE side of the bridge. Live
//! values are dropped rather than queued while the broker is away.

use super::connection::{
    configure_mqtt_options, determine_qos_level, route_mqtt_event, should_forward,
    ConnectionState, EventRoute, MqttError, ReconnectConfig,
};
use crate::config::BridgeConfig;
use crate::mqtt_span;
use crate::protocol::TopicMap;
use crate::transport::Publisher;
use async_trait::async_trait;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Requests buffered between the bridge and the event loop
const REQUEST_CAPACITY: usize = 100;

/// How long shutdown waits for queued publishes to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// MQTT publisher with a self-healing background event loop
pub struct MqttPublisher {
    client: AsyncClient,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MqttPublisher {
    /// Create the client and spawn its event loop.
    ///
    /// Must be called from within a tokio runtime. The broker connection is
    /// established in the background; use [`MqttPublisher::wait_until_connected`]
    /// to block on it.
    pub fn start(config: &BridgeConfig, topics: &TopicMap) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(config, topics)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            Self::setup_connection_channels();

        let span = mqtt_span!(broker = %config.mqtt.broker_url);
        let handle = tokio::spawn(
            Self::run_event_loop(
                event_loop,
                state_tx,
                shutdown_rx,
                ReconnectConfig::default(),
            )
            .instrument(span),
        );

        info!("MQTT publisher started for {}", config.mqtt.broker_url);

        Ok(Self {
            client,
            state_rx,
            shutdown_tx,
            event_loop_handle: Mutex::new(Some(handle)),
        })
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Drive the rumqttc event loop until shutdown.
    ///
    /// rumqttc reconnects on the next `poll` after an error, so recovery is
    /// just a backoff sleep followed by another poll.
    async fn run_event_loop(
        mut event_loop: EventLoop,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
        reconnect_config: ReconnectConfig,
    ) {
        let mut reconnect_attempts = 0u32;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping MQTT event loop");
                        break;
                    }
                }

                event_result = event_loop.poll() => {
                    match event_result {
                        Ok(event) => match route_mqtt_event(&event) {
                            EventRoute::ConnectionAcknowledged => {
                                reconnect_attempts = 0;
                                info!("MQTT broker connection established");
                                let _ = state_tx.send(ConnectionState::Connected);
                            }
                            EventRoute::Disconnected => {
                                warn!("MQTT broker closed the connection");
                                let _ = state_tx.send(ConnectionState::Disconnected(
                                    "Broker disconnected".to_string(),
                                ));
                            }
                            EventRoute::DisconnectSent => {
                                info!("MQTT disconnect sent, stopping event loop");
                                break;
                            }
                            EventRoute::Other => {
                                debug!(target: "mqtt_transport", "MQTT event: {:?}", event);
                            }
                        },
                        Err(e) => {
                            error!("MQTT event loop error: {}", e);
                            let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));

                            reconnect_attempts = reconnect_attempts.saturating_add(1);
                            let delay_ms = reconnect_config.calculate_backoff_delay(reconnect_attempts);
                            let _ = state_tx.send(ConnectionState::Reconnecting(reconnect_attempts));
                            info!(
                                "Reconnecting to MQTT broker (attempt {}) after {}ms",
                                reconnect_attempts, delay_ms
                            );

                            if !Self::interruptible_sleep(shutdown_rx.clone(), delay_ms).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        let _ = state_tx.send(ConnectionState::Stopped);
        info!("MQTT event loop stopped");
    }

    /// Perform interruptible sleep with shutdown monitoring
    /// Returns true if sleep completed, false if shutdown requested
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        if *shutdown_rx.borrow() {
            return false;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received during reconnection delay, stopping");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                true
            }
        }
    }

    /// Wait for a ConnAck, bounded by `timeout`
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<(), MqttError> {
        Self::wait_for_connection_confirmation(self.state_rx.clone(), timeout).await
    }

    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let result = tokio::time::timeout(timeout, async {
            loop {
                if *state_rx.borrow_and_update() == ConnectionState::Connected {
                    return Ok(());
                }
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailed(
                        "State channel closed".to_string().into(),
                    ));
                }
            }
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(MqttError::NotConnected {
                state: state_rx.borrow().clone(),
            }),
        }
    }

    /// Get current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Send DISCONNECT after queued publishes and stop the event loop.
    ///
    /// When the broker is unreachable the loop is stopped right away; queued
    /// publishes are dropped.
    pub async fn shutdown(&self) {
        if let Err(e) = self.client.try_disconnect() {
            warn!("Failed to queue MQTT disconnect: {}", e);
        }
        if self.connection_state() != ConnectionState::Connected {
            let _ = self.shutdown_tx.send(true);
        }

        let handle = self
            .event_loop_handle
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());

        if let Some(mut handle) = handle {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => info!("MQTT event loop shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => warn!("MQTT event loop ended with error: {}", e),
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!("MQTT event loop didn't shut down gracefully, forcing abort");
                    let _ = self.shutdown_tx.send(true);
                    handle.abort();
                }
            }
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    type Error = MqttError;

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), Self::Error> {
        let state = self.connection_state();
        if !should_forward(retain, &state) {
            debug!(topic, ?state, "Broker unavailable, dropping live publish");
            return Ok(());
        }

        let qos = determine_qos_level(retain);
        self.client
            .try_publish(topic, qos, retain, payload)
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Ok(mut guard) = self.event_loop_handle.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_connection_channels() {
        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            MqttPublisher::setup_connection_channels();

        assert_eq!(*state_rx.borrow(), ConnectionState::Connecting);
        assert!(!(*shutdown_rx.borrow()));

        state_tx.send(ConnectionState::Connected).unwrap();
        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);

        shutdown_tx.send(true).unwrap();
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_success() {
        let ((state_tx, state_rx), (_, _)) = MqttPublisher::setup_connection_channels();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(ConnectionState::Connected);
        });

        let result =
            MqttPublisher::wait_for_connection_confirmation(state_rx, Duration::from_millis(500))
                .await;
        assert!(result.is_ok(), "Should successfully wait for connection");
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_timeout() {
        let ((state_tx, state_rx), (_, _)) = MqttPublisher::setup_connection_channels();

        let result =
            MqttPublisher::wait_for_connection_confirmation(state_rx, Duration::from_millis(10))
                .await;
        drop(state_tx);

        assert!(matches!(
            result,
            Err(MqttError::NotConnected {
                state: ConnectionState::Connecting
            })
        ));
    }

    #[tokio::test]
    async fn test_interruptible_sleep_completes() {
        let ((_, _), (_shutdown_tx, shutdown_rx)) = MqttPublisher::setup_connection_channels();

        let result = MqttPublisher::interruptible_sleep(shutdown_rx, 10).await;
        assert!(result, "Sleep should complete without interruption");
    }

    #[tokio::test]
    async fn test_interruptible_sleep_interrupted() {
        let ((_, _), (shutdown_tx, shutdown_rx)) = MqttPublisher::setup_connection_channels();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = shutdown_tx.send(true);
        });

        let result = MqttPublisher::interruptible_sleep(shutdown_rx, 10_000).await;
        assert!(!result, "Sleep should be interrupted by shutdown signal");
    }

    fn unreachable_broker() -> MqttPublisher {
        let mut config = BridgeConfig::test_config();
        // Nothing listens on this port; the event loop keeps retrying in the background
        config.mqtt.broker_url = "mqtt://127.0.0.1:1".to_string();
        let topics = TopicMap::new(config.host(), &config.mqtt.discovery_prefix);
        MqttPublisher::start(&config, &topics).unwrap()
    }

    #[tokio::test]
    async fn test_retained_publish_is_queued_without_broker() {
        let publisher = unreachable_broker();

        let result = publisher
            .publish("homeassistant/sensor/test-host/spo2/config", b"{}".to_vec(), true)
            .await;
        assert!(result.is_ok(), "Publish should only enqueue: {result:?}");
        assert_ne!(publisher.connection_state(), ConnectionState::Connected);

        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn test_outage_readings_do_not_crowd_out_later_publishes() {
        let publisher = unreachable_broker();
        let spo2 = "homeassistant/sensor/test-host/spo2/state";

        for _ in 0..REQUEST_CAPACITY + 20 {
            publisher.publish(spo2, b"95".to_vec(), false).await.unwrap();
        }

        // The request queue still has room: nothing stale is waiting for replay
        let status = publisher
            .publish("homeassistant/sensor/test-host/status/state", b"Off".to_vec(), false)
            .await;
        assert!(status.is_ok(), "Flush publish rejected: {status:?}");
        for _ in 0..REQUEST_CAPACITY - 1 {
            publisher
                .publish("homeassistant/sensor/test-host/ppg/config", b"{}".to_vec(), true)
                .await
                .unwrap();
        }

        publisher.shutdown().await;
    }
}
