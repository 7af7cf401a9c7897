//! MQTT publisher for the bridge
//!
//! - [`connection`] - pure option building, state and event routing
//! - [`client`] - the rumqttc client and its background event loop
//!
//! # Usage
//!
//! ```rust,no_run
//! use pulseox_bridge::config::BridgeConfig;
//! use pulseox_bridge::protocol::TopicMap;
//! use pulseox_bridge::transport::mqtt::MqttPublisher;
//! use pulseox_bridge::transport::Publisher;
//! use std::path::Path;
//!
//! # tokio_test_block_on(async {
//! let config = BridgeConfig::load_from_file(Path::new("pulseox.toml"))?;
//! let topics = TopicMap::new(config.host(), &config.mqtt.discovery_prefix);
//! let publisher = MqttPublisher::start(&config, &topics)?;
//! publisher.publish("pulseox/bedroom/sensors/spo2", b"97".to_vec(), false).await?;
//! publisher.shutdown().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod client;
pub mod connection;

pub use client::MqttPublisher;
pub use connection::{ConnectionState, MqttError, ReconnectConfig};
