//! Wire-level knowledge about the oximeter and the MQTT layout
//!
//! - [`frames`] decodes notification payloads
//! - [`topics`] maps output channels to MQTT topics
//! - [`discovery`] builds Home Assistant discovery configs

pub mod discovery;
pub mod frames;
pub mod topics;

pub use discovery::{build_discovery_messages, publish_discovery, DiscoveryPayload};
pub use frames::{decode, Frame, VitalReading, WaveformSample};
pub use topics::{Channel, TopicMap};

use uuid::Uuid;

/// Vendor service carrying the measurement notifications
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000fff0_0000_1000_8000_00805f9b34fb);

/// Prefix shared by client characteristic configuration descriptors
pub const CCCD_PREFIX: &str = "00002902";

/// Full UUID of the client characteristic configuration descriptor
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// CCCD value that enables notifications
pub const ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];

/// CCCD value that disables notifications
pub const DISABLE_NOTIFICATIONS: [u8; 2] = [0x00, 0x00];
