//! Home Assistant MQTT discovery payloads
//!
//! One retained config message per sensor lets Home Assistant create the
//! entities without manual setup. Field names use the abbreviated discovery
//! keys (`stat_t`, `uniq_id`, ...).

use super::topics::{Channel, TopicMap};
use crate::config::BridgeConfig;
use crate::transport::Publisher;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Availability payload advertised while the sensor is reading
pub const PAYLOAD_AVAILABLE: &str = "ON";

/// Availability payload advertised otherwise
pub const PAYLOAD_NOT_AVAILABLE: &str = "OFF";

/// Static description of one announced sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDescriptor {
    pub channel: Channel,
    pub name: &'static str,
    pub units: &'static str,
    pub icon: &'static str,
    pub category: Option<&'static str>,
}

impl SensorDescriptor {
    /// Descriptor for a sensor channel; `None` for the availability channel
    pub fn for_channel(channel: Channel) -> Option<Self> {
        let (name, units, icon, category) = match channel {
            Channel::Spo2 => ("SpO2", "%", "mdi:water-percent", None),
            Channel::Bpm => ("Heart Rate", "BPM", "mdi:heart-pulse", None),
            Channel::PerfusionIndex => (
                "Perfusion Index",
                "%",
                "mdi:water-opacity",
                Some("diagnostic"),
            ),
            Channel::Status => ("Status", "", "mdi:check-network", Some("diagnostic")),
            Channel::Ppg => ("PPG", "", "mdi:heart-pulse", Some("diagnostic")),
            Channel::Availability => return None,
        };
        Some(Self {
            channel,
            name,
            units,
            icon,
            category,
        })
    }
}

/// Device block shared by every sensor of the bridge
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeviceInfo {
    pub ids: Vec<String>,
    pub cns: Vec<[String; 2]>,
    pub name: String,
    #[serde(rename = "mdl")]
    pub model: String,
    #[serde(rename = "mf")]
    pub manufacturer: String,
    #[serde(rename = "sw")]
    pub software_version: String,
}

/// Discovery config for one sensor
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiscoveryPayload {
    #[serde(rename = "stat_t")]
    pub state_topic: String,
    #[serde(rename = "unit_of_meas")]
    pub unit_of_measurement: String,
    pub icon: String,
    #[serde(rename = "uniq_id")]
    pub unique_id: String,
    #[serde(rename = "dev")]
    pub device: DeviceInfo,
    #[serde(rename = "avty_t", skip_serializing_if = "Option::is_none")]
    pub availability_topic: Option<String>,
    #[serde(rename = "pl_avail", skip_serializing_if = "Option::is_none")]
    pub payload_available: Option<String>,
    #[serde(rename = "pl_not_avail", skip_serializing_if = "Option::is_none")]
    pub payload_not_available: Option<String>,
    #[serde(rename = "ent_cat", skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<String>,
    pub name: String,
}

/// A ready-to-publish discovery message
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub payload: DiscoveryPayload,
}

/// Build the discovery payload for one sensor.
///
/// The status sensor carries no availability topic so that it stays visible
/// while the oximeter itself is unavailable.
pub fn build_payload(
    config: &BridgeConfig,
    topics: &TopicMap,
    sensor: &SensorDescriptor,
) -> DiscoveryPayload {
    let host = topics.host();
    let device = DeviceInfo {
        ids: vec![host.to_string()],
        cns: vec![["mac".to_string(), config.device.address.to_lowercase()]],
        name: format!("{} Pulse Oximeter", config.device.brand),
        model: config.device.model.clone(),
        manufacturer: config.device.brand.clone(),
        software_version: config.version().to_string(),
    };

    let with_availability = sensor.channel != Channel::Status;
    let availability = |value: &str| with_availability.then(|| value.to_string());

    DiscoveryPayload {
        state_topic: topics.topic(sensor.channel).to_string(),
        unit_of_measurement: sensor.units.to_string(),
        icon: sensor.icon.to_string(),
        unique_id: format!("{host}_{}", sensor.channel.id()),
        name: format!("{} {}", device.name, sensor.name),
        device,
        availability_topic: availability(topics.topic(Channel::Availability)),
        payload_available: availability(PAYLOAD_AVAILABLE),
        payload_not_available: availability(PAYLOAD_NOT_AVAILABLE),
        entity_category: sensor.category.map(str::to_string),
    }
}

/// Build every discovery message the bridge announces
pub fn build_discovery_messages(config: &BridgeConfig, topics: &TopicMap) -> Vec<DiscoveryMessage> {
    Channel::SENSORS
        .into_iter()
        .filter_map(SensorDescriptor::for_channel)
        .map(|sensor| DiscoveryMessage {
            topic: topics.discovery_topic(sensor.channel),
            payload: build_payload(config, topics, &sensor),
        })
        .collect()
}

/// Publish all discovery configs as retained messages.
///
/// Serialization failures are returned; publish failures are logged and
/// skipped so one rejected config does not hide the others.
pub async fn publish_discovery<P>(
    publisher: &P,
    config: &BridgeConfig,
    topics: &TopicMap,
) -> Result<usize, serde_json::Error>
where
    P: Publisher + ?Sized,
{
    let mut published = 0;
    for message in build_discovery_messages(config, topics) {
        let payload = serde_json::to_vec(&message.payload)?;
        debug!(topic = %message.topic, "Publishing discovery config");
        match publisher.publish(&message.topic, payload, true).await {
            Ok(()) => published += 1,
            Err(e) => warn!(topic = %message.topic, "Failed to publish discovery config: {}", e),
        }
    }
    info!("Published {} discovery configs", published);
    Ok(published)
}
