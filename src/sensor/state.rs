//! Operating state reported for the oximeter

use crate::protocol::discovery::{PAYLOAD_AVAILABLE, PAYLOAD_NOT_AVAILABLE};
use std::fmt;

/// What the sensor is doing, as seen from the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingState {
    /// Finger in place, values published
    Reading,
    /// Device is settling and reports out-of-range values
    Calibrating,
    /// No usable data
    Off,
    /// Link dropped, waiting to reconnect
    Reconnecting,
}

impl OperatingState {
    /// Payload for the status topic
    pub fn label(&self) -> &'static str {
        match self {
            OperatingState::Reading => "Reading",
            OperatingState::Calibrating => "Calibrating",
            OperatingState::Off => "Off",
            OperatingState::Reconnecting => "Reconnecting",
        }
    }

    /// Payload for the availability topic; only live readings are available
    pub fn availability(&self) -> &'static str {
        match self {
            OperatingState::Reading => PAYLOAD_AVAILABLE,
            _ => PAYLOAD_NOT_AVAILABLE,
        }
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_and_availability() {
        let cases = [
            (OperatingState::Reading, "Reading", "ON"),
            (OperatingState::Calibrating, "Calibrating", "OFF"),
            (OperatingState::Off, "Off", "OFF"),
            (OperatingState::Reconnecting, "Reconnecting", "OFF"),
        ];
        for (state, label, availability) in cases {
            assert_eq!(state.label(), label);
            assert_eq!(state.to_string(), label);
            assert_eq!(state.availability(), availability);
        }
    }
}
