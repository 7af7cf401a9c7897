//! Configuration loading and validation tests
//!
//! Tests focus on behavior: what loads, what defaults apply, what is rejected.

use pulseox_bridge::config::{BridgeConfig, ConfigError};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
exit_code = 3

[device]
address = "FF:FF:FF:FF:36:12"
brand = "Contec"
model = "CMS50D+"
host = "bedroom-pi"
adapter_index = 1

[mqtt]
broker_url = "mqtts://broker.local:8883"
username_env = "PULSEOX_TEST_MQTT_USER"
password_env = "PULSEOX_TEST_MQTT_PASS"
discovery_prefix = "ha"

[timing]
read_period_secs = 1
inactivity_timeout_secs = 60
"#,
    );

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.exit_code, 3);
    assert_eq!(config.host(), "bedroom-pi");
    assert_eq!(config.device.brand, "Contec");
    assert_eq!(config.device.adapter_index, 1);
    assert_eq!(config.mqtt.discovery_prefix, "ha");
    assert_eq!(config.timing.read_period(), Duration::from_secs(1));
    assert_eq!(config.timing.inactivity_threshold(), 60);
    // Untouched timings keep their defaults
    assert_eq!(config.timing.reconnect_delay(), Duration::from_secs(10));
    assert_eq!(config.timing.inactivity_delay(), Duration::from_secs(130));
}

#[test]
fn test_config_defaults() {
    let config = BridgeConfig::parse_with_env(
        r#"
[device]
address = "ff:ff:ff:ff:36:12"

[mqtt]
broker_url = "mqtt://localhost"
"#,
        |_| None,
    )
    .unwrap();

    assert_eq!(config.exit_code, 1);
    assert_eq!(config.host(), "pulseox");
    assert_eq!(config.version(), "");
    assert_eq!(config.device.model, "Generic");
    assert_eq!(config.timing.notification_timeout(), Duration::from_secs(1));
    assert_eq!(config.timing.inactivity_threshold(), 150);
}

#[test]
fn test_missing_file_is_a_read_error() {
    let result = BridgeConfig::load_from_file(std::path::Path::new("/nonexistent/pulseox.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_rejected() {
    let temp_file = write_config("[device\naddress = ");
    let result = BridgeConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_required_section_is_rejected() {
    let temp_file = write_config(
        r#"
[device]
address = "FF:FF:FF:FF:36:12"
"#,
    );
    let result = BridgeConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        ("FF:FF:FF:FF:36", "mqtt://localhost", ""),
        ("FF:FF:FF:FF:36:12", "http://localhost", ""),
        ("FF:FF:FF:FF:36:12", "mqtt://localhost", "read_period_secs = 0"),
        (
            "FF:FF:FF:FF:36:12",
            "mqtt://localhost",
            "read_period_secs = 10\ninactivity_timeout_secs = 5",
        ),
    ];

    for (address, broker, timing) in cases {
        let content = format!(
            "[device]\naddress = \"{address}\"\nhost = \"h\"\n\n[mqtt]\nbroker_url = \"{broker}\"\n\n[timing]\n{timing}\n"
        );
        let result = BridgeConfig::parse_with_env(&content, |_| None);
        assert!(result.is_err(), "accepted {address} {broker} {timing:?}");
    }
}

#[test]
fn test_env_overrides_win_over_file() {
    let config = BridgeConfig::parse_with_env(
        r#"
[device]
address = "FF:FF:FF:FF:36:12"

[mqtt]
broker_url = "mqtt://localhost"
"#,
        |name| match name {
            "BLE_ADDRESS" => Some("00:11:22:33:44:55".to_string()),
            "MQTT_BROKER_URL" => Some("mqtt://broker:1884".to_string()),
            "HOSTNAME" => Some("kitchen".to_string()),
            "BALENA_RELEASE_HASH" => Some("abc123".to_string()),
            _ => None,
        },
    )
    .unwrap();

    assert_eq!(config.device.address, "00:11:22:33:44:55");
    assert_eq!(config.mqtt.broker_url, "mqtt://broker:1884");
    assert_eq!(config.host(), "kitchen");
    assert_eq!(config.version(), "abc123");
}

#[test]
fn test_invalid_override_is_rejected() {
    let result = BridgeConfig::parse_with_env(
        r#"
[device]
address = "FF:FF:FF:FF:36:12"

[mqtt]
broker_url = "mqtt://localhost"
"#,
        |name| (name == "BLE_ADDRESS").then(|| "not-a-mac".to_string()),
    );
    assert!(matches!(result, Err(ConfigError::InvalidDeviceAddress(_))));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = BridgeConfig::parse_with_env(
        r#"
[device]
address = "FF:FF:FF:FF:36:12"
host = "bedroom-pi"

[mqtt]
broker_url = "mqtt://localhost"
"#,
        |_| None,
    )
    .unwrap();

    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed = BridgeConfig::parse_with_env(&rendered, |_| None).unwrap();
    assert_eq!(reparsed, config);
}
