//! pulseox-bridge
//!
//! Bridges a BLE pulse oximeter to MQTT: decodes its notification frames,
//! classifies readings into an operating state and publishes values, status
//! and availability for Home Assistant.
//!
//! # Overview
//!
//! - [`link::LinkManager`] connects to the device, subscribes to notifications,
//!   polls and reconnects with backoff
//! - [`protocol::decode`] turns raw frames into typed readings
//! - [`sensor::ReadingClassifier`] publishes readings and state through a
//!   [`transport::Publisher`]
//!
//! # Quick Start
//!
//! ```rust
//! use pulseox_bridge::protocol::{decode, Frame};
//! use pulseox_bridge::sensor::{classify, OperatingState};
//!
//! let Frame::Vital(reading) = decode(&[0xF1, 95, 80, 0, 12, 0, 0]) else {
//!     panic!("not a vital frame");
//! };
//! assert_eq!(reading.spo2, 95);
//! assert_eq!(classify(&reading), OperatingState::Reading);
//! ```

pub mod config;
pub mod error;
pub mod link;
pub mod observability;
pub mod protocol;
pub mod sensor;
pub mod testing;
pub mod transport;

pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult};
pub use link::{DeviceSession, LinkManager};
pub use sensor::{OperatingState, ReadingClassifier};
pub use transport::mqtt::MqttPublisher;
pub use transport::{DeviceLink, Publisher};
