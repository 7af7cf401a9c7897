//! Topic layout for published readings
//!
//! Sensor state topics live under `pulseox/{host}/sensors/{id}`, while the
//! shared availability topic and the discovery configs live under the Home
//! Assistant discovery prefix.

use std::fmt;

/// Logical output channel of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Spo2,
    Bpm,
    PerfusionIndex,
    Ppg,
    Status,
    Availability,
}

impl Channel {
    /// Channels that are announced as Home Assistant sensors
    pub const SENSORS: [Channel; 5] = [
        Channel::Spo2,
        Channel::Bpm,
        Channel::PerfusionIndex,
        Channel::Status,
        Channel::Ppg,
    ];

    /// Identifier used in topics and unique ids
    pub fn id(self) -> &'static str {
        match self {
            Channel::Spo2 => "spo2",
            Channel::Bpm => "bpm",
            Channel::PerfusionIndex => "pi",
            Channel::Ppg => "ppg",
            Channel::Status => "status",
            Channel::Availability => "availability",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Resolved destination topic for every channel, built once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMap {
    host: String,
    discovery_prefix: String,
    spo2: String,
    bpm: String,
    pi: String,
    ppg: String,
    status: String,
    availability: String,
}

impl TopicMap {
    pub fn new(host: &str, discovery_prefix: &str) -> Self {
        let sensor = |channel: Channel| format!("pulseox/{host}/sensors/{}", channel.id());
        Self {
            host: host.to_string(),
            discovery_prefix: discovery_prefix.to_string(),
            spo2: sensor(Channel::Spo2),
            bpm: sensor(Channel::Bpm),
            pi: sensor(Channel::PerfusionIndex),
            ppg: sensor(Channel::Ppg),
            status: sensor(Channel::Status),
            availability: format!("{discovery_prefix}/sensor/{host}/availability"),
        }
    }

    /// Destination topic for a channel
    pub fn topic(&self, channel: Channel) -> &str {
        match channel {
            Channel::Spo2 => &self.spo2,
            Channel::Bpm => &self.bpm,
            Channel::PerfusionIndex => &self.pi,
            Channel::Ppg => &self.ppg,
            Channel::Status => &self.status,
            Channel::Availability => &self.availability,
        }
    }

    /// Reverse lookup, used when inspecting published traffic
    pub fn channel_for(&self, topic: &str) -> Option<Channel> {
        Channel::SENSORS
            .into_iter()
            .chain(std::iter::once(Channel::Availability))
            .find(|channel| self.topic(*channel) == topic)
    }

    /// Discovery config topic for a sensor channel
    pub fn discovery_topic(&self, channel: Channel) -> String {
        format!(
            "{}/sensor/{}/{}/config",
            self.discovery_prefix,
            self.host,
            channel.id()
        )
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}
