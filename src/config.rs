//! Configuration system for the pulse oximeter bridge
//!
//! Configuration is read from a TOML file. Credentials never live in the file:
//! the `[mqtt]` section names the environment variables that hold them, and
//! those are resolved when the MQTT options are built. A small set of
//! environment overrides (`BLE_ADDRESS`, `MQTT_BROKER_URL`, `HOSTNAME`,
//! `BALENA_RELEASE_HASH`) is applied at load time so the same file can be
//! shipped to several hosts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Host identity used when neither the file nor `HOSTNAME` provides one
pub const DEFAULT_HOST: &str = "pulseox";

/// Main bridge configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Process exit code used after an interrupt-driven shutdown
    #[serde(default = "default_exit_code")]
    pub exit_code: i32,
    pub device: DeviceSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub timing: TimingSection,
}

/// Sensor identity and BLE adapter selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// BLE MAC address of the oximeter (`AA:BB:CC:DD:EE:FF`)
    pub address: String,
    #[serde(default = "default_brand")]
    pub brand: String,
    #[serde(default = "default_brand")]
    pub model: String,
    /// Software version advertised in discovery payloads
    pub version: Option<String>,
    /// Bridge host name, used in topics and unique ids
    pub host: Option<String>,
    /// Index into the list of local BLE adapters
    #[serde(default)]
    pub adapter_index: usize,
    /// How long a connect attempt scans for the peripheral
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Home Assistant discovery prefix
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

/// Polling, backoff and inactivity timings, all in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingSection {
    #[serde(default = "default_read_period")]
    pub read_period_secs: u64,
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
    #[serde(default = "default_inactivity_delay")]
    pub inactivity_delay_secs: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            read_period_secs: default_read_period(),
            notification_timeout_secs: default_notification_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
            inactivity_timeout_secs: default_inactivity_timeout(),
            inactivity_delay_secs: default_inactivity_delay(),
        }
    }
}

impl TimingSection {
    pub fn read_period(&self) -> Duration {
        Duration::from_secs(self.read_period_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn inactivity_delay(&self) -> Duration {
        Duration::from_secs(self.inactivity_delay_secs)
    }

    /// Number of consecutive empty poll cycles that counts as inactivity
    pub fn inactivity_threshold(&self) -> u32 {
        let cycles = self.inactivity_timeout_secs / self.read_period_secs.max(1);
        u32::try_from(cycles).unwrap_or(u32::MAX)
    }
}

fn default_exit_code() -> i32 {
    1
}

fn default_brand() -> String {
    "Generic".to_string()
}

fn default_scan_timeout() -> u64 {
    15
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_read_period() -> u64 {
    2
}

fn default_notification_timeout() -> u64 {
    1
}

fn default_reconnect_delay() -> u64 {
    10
}

fn default_inactivity_timeout() -> u64 {
    300
}

fn default_inactivity_delay() -> u64 {
    130
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid device address: {0}")]
    InvalidDeviceAddress(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from TOML file with environment overrides applied
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_with_env(&content, |name| std::env::var(name).ok())
    }

    /// Parse configuration text, resolving overrides through `lookup`
    pub fn parse_with_env<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: BridgeConfig = toml::from_str(content)?;
        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("BLE_ADDRESS") {
            self.device.address = address;
        }
        if let Some(broker_url) = lookup("MQTT_BROKER_URL") {
            self.mqtt.broker_url = broker_url;
        }
        if self.device.host.is_none() {
            self.device.host = lookup("HOSTNAME").filter(|h| !h.is_empty());
        }
        if self.device.version.is_none() {
            self.device.version = lookup("BALENA_RELEASE_HASH");
        }
    }

    /// Check every field the bridge relies on at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_address(&self.device.address)?;
        validate_broker_url(&self.mqtt.broker_url)?;
        validate_topic_segment("device.host", self.host())?;
        validate_topic_segment("mqtt.discovery_prefix", &self.mqtt.discovery_prefix)?;

        let timing = &self.timing;
        let positive = [
            ("timing.read_period_secs", timing.read_period_secs),
            (
                "timing.notification_timeout_secs",
                timing.notification_timeout_secs,
            ),
            ("timing.reconnect_delay_secs", timing.reconnect_delay_secs),
            (
                "timing.inactivity_timeout_secs",
                timing.inactivity_timeout_secs,
            ),
            ("timing.inactivity_delay_secs", timing.inactivity_delay_secs),
            ("device.scan_timeout_secs", self.device.scan_timeout_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if timing.inactivity_timeout_secs < timing.read_period_secs {
            return Err(ConfigError::InvalidConfig(format!(
                "timing.inactivity_timeout_secs ({}) must be at least timing.read_period_secs ({})",
                timing.inactivity_timeout_secs, timing.read_period_secs
            )));
        }

        Ok(())
    }

    /// Bridge host identity used in topics
    pub fn host(&self) -> &str {
        self.device.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    /// Software version advertised in discovery payloads
    pub fn version(&self) -> &str {
        self.device.version.as_deref().unwrap_or("")
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Get MQTT username from environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.username_env.as_ref())
    }

    /// Get MQTT password, failing when a username is configured without one
    pub fn get_mqtt_password(&self) -> Result<Option<String>, ConfigError> {
        match &self.mqtt.password_env {
            Some(name) if self.get_mqtt_username().is_some() => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
            Some(name) => Ok(std::env::var(name).ok()),
            None => Ok(None),
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
address = "FF:FF:FF:FF:36:12"
host = "test-host"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate a BLE MAC address: six colon-separated hex octets
pub fn validate_device_address(address: &str) -> Result<(), ConfigError> {
    let octets: Vec<&str> = address.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));

    if !valid {
        return Err(ConfigError::InvalidDeviceAddress(format!(
            "'{address}' must look like AA:BB:CC:DD:EE:FF"
        )));
    }
    Ok(())
}

fn validate_broker_url(broker_url: &str) -> Result<(), ConfigError> {
    let url =
        Url::parse(broker_url).map_err(|_| ConfigError::InvalidBrokerUrl(broker_url.to_string()))?;
    if !matches!(url.scheme(), "mqtt" | "mqtts") || url.host_str().is_none() {
        return Err(ConfigError::InvalidBrokerUrl(broker_url.to_string()));
    }
    Ok(())
}

fn validate_topic_segment(field: &str, segment: &str) -> Result<(), ConfigError> {
    if segment.is_empty() || segment.contains(['/', '+', '#']) {
        return Err(ConfigError::InvalidConfig(format!(
            "{field} '{segment}' is not a valid MQTT topic segment"
        )));
    }
    Ok(())
}
