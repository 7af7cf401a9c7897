//! Error types for the pulse oximeter bridge
//!
//! Each layer owns its own error enum (`ConfigError`, `LinkError`, `MqttError`,
//! `CycleError`); `BridgeError` is the umbrella used by the entry point and by
//! the test doubles.

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("MQTT error: {0}")]
    MqttError(#[from] crate::transport::mqtt::MqttError),

    #[error("BLE error: {0}")]
    LinkError(#[from] crate::transport::ble::LinkError),

    #[error("Link cycle failed: {0}")]
    CycleError(#[from] crate::link::CycleError),

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl BridgeError {
    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::link::CycleError;

    #[test]
    fn test_internal_error_constructor() {
        let error = BridgeError::internal_error("unexpected state");
        assert!(matches!(error, BridgeError::InternalError { .. }));
        assert_eq!(error.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_config_error_wraps_message() {
        let error: BridgeError = ConfigError::InvalidConfig("bad".to_string()).into();
        assert!(matches!(error, BridgeError::ConfigError(_)));
        assert_eq!(
            error.to_string(),
            "Configuration error: Invalid configuration: bad"
        );
    }

    #[test]
    fn test_cycle_error_wraps_source() {
        let error: BridgeError = CycleError::DescriptorNotFound("00002902").into();
        assert!(matches!(error, BridgeError::CycleError(_)));
        assert!(error.to_string().contains("00002902"));
    }
}
