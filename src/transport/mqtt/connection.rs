//! Pure connection state management for the MQTT publisher
//!
//! This module contains pure functions for connection state management,
//! option construction and event routing. Nothing here touches the network.

use crate::config::{BridgeConfig, ConfigError};
use crate::protocol::discovery::PAYLOAD_NOT_AVAILABLE;
use crate::protocol::{Channel, TopicMap};
use rumqttc::v5::mqttbytes::v5::{LastWill, Packet};
use rumqttc::v5::{mqttbytes::QoS, Event, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state of the background event loop
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// ConnAck received, publishes flow to the broker
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Waiting before reconnection attempt (attempt count)
    Reconnecting(u32),
    /// Event loop stopped on request
    Stopped,
}

/// Backoff applied between event loop failures
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Backoff pattern in milliseconds
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![250, 500, 1000, 2500],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Calculate backoff delay for given attempt using the pattern
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Credentials unavailable: {0}")]
    Credentials(#[from] ConfigError),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
}

/// What the event loop should do with one polled event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker accepted the connection
    ConnectionAcknowledged,
    /// Broker closed the connection
    Disconnected,
    /// Our own DISCONNECT left the client; the loop can stop
    DisconnectSent,
    /// Anything else (acks, pings, outgoing publishes)
    Other,
}

/// Route an MQTT event (pure function)
pub fn route_mqtt_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => EventRoute::ConnectionAcknowledged,
        Event::Incoming(Packet::Disconnect(_)) => EventRoute::Disconnected,
        Event::Outgoing(rumqttc::Outgoing::Disconnect) => EventRoute::DisconnectSent,
        _ => EventRoute::Other,
    }
}

/// Retained messages (discovery) use QoS 1; live readings use QoS 0 (pure function)
pub fn determine_qos_level(retain: bool) -> QoS {
    match retain {
        true => QoS::AtLeastOnce,
        false => QoS::AtMostOnce,
    }
}

/// Whether a publish should be handed to the client in `state` (pure function)
///
/// Live values are dropped while the broker is unreachable: queued they would
/// fill the request channel and be replayed as stale state on reconnect,
/// crowding out the flush that clears them. Retained discovery is still queued.
pub fn should_forward(retain: bool, state: &ConnectionState) -> bool {
    retain || *state == ConnectionState::Connected
}

/// Build MQTT options from the bridge configuration
///
/// The last will marks the sensor unavailable if the bridge dies without
/// flushing.
pub fn configure_mqtt_options(
    config: &BridgeConfig,
    topics: &TopicMap,
) -> Result<MqttOptions, MqttError> {
    let broker_url = &config.mqtt.broker_url;
    let url = Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    // Unique client id per process start to avoid broker session takeover
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let client_id = format!("pulseox-{}-{timestamp}", topics.host());
    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = config.get_mqtt_username() {
        let password = config.get_mqtt_password()?.unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs));

    let lwt = LastWill::new(
        topics.topic(Channel::Availability).to_string(),
        PAYLOAD_NOT_AVAILABLE.to_string(),
        QoS::AtLeastOnce,
        true,
        None,
    );
    mqtt_options.set_last_will(lwt);

    Ok(mqtt_options)
}
