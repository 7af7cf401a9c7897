//! Test helpers and utilities for integration tests

use pulseox_bridge::config::BridgeConfig;
use pulseox_bridge::link::LinkManager;
use pulseox_bridge::protocol::TopicMap;
use pulseox_bridge::testing::{MockLink, MockPublisher};
use std::sync::Arc;

/// Sensor topics for the host used by [`test_config`]
#[allow(dead_code)]
pub const SPO2: &str = "pulseox/test-host/sensors/spo2";
#[allow(dead_code)]
pub const BPM: &str = "pulseox/test-host/sensors/bpm";
#[allow(dead_code)]
pub const PI: &str = "pulseox/test-host/sensors/pi";
#[allow(dead_code)]
pub const PPG: &str = "pulseox/test-host/sensors/ppg";
#[allow(dead_code)]
pub const STATUS: &str = "pulseox/test-host/sensors/status";
#[allow(dead_code)]
pub const AVAILABILITY: &str = "homeassistant/sensor/test-host/availability";

/// Default timings, no environment lookups
#[allow(dead_code)]
pub fn test_config() -> BridgeConfig {
    config_with_timing("")
}

/// Configuration with the given `[timing]` body, no environment lookups
#[allow(dead_code)]
pub fn config_with_timing(timing: &str) -> BridgeConfig {
    let content = format!(
        r#"
[device]
address = "FF:FF:FF:FF:36:12"
host = "test-host"
version = "test"

[mqtt]
broker_url = "mqtt://localhost:1883"

[timing]
{timing}
"#
    );
    BridgeConfig::parse_with_env(&content, |_| None).expect("test config should be valid")
}

/// Build a manager over a mock link and a recording publisher
#[allow(dead_code)]
pub fn mock_manager(
    link: MockLink,
    config: &BridgeConfig,
) -> (LinkManager<MockLink, MockPublisher>, Arc<MockPublisher>) {
    let publisher = Arc::new(MockPublisher::new());
    let topics = TopicMap::new(config.host(), &config.mqtt.discovery_prefix);
    (
        LinkManager::new(link, publisher.clone(), topics, config),
        publisher,
    )
}

/// The six publishes a flush produces, in order
#[allow(dead_code)]
pub fn flush_pairs() -> Vec<(String, String)> {
    [
        (STATUS, "Off"),
        (AVAILABILITY, "OFF"),
        (SPO2, ""),
        (BPM, ""),
        (PI, ""),
        (PPG, ""),
    ]
    .into_iter()
    .map(|(t, p)| (t.to_string(), p.to_string()))
    .collect()
}

/// Shorthand for building expected `(topic, payload)` lists
#[allow(dead_code)]
pub fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(t, p)| (t.to_string(), p.to_string()))
        .collect()
}
