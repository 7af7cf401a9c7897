//! Transport layer for the bridge
//!
//! Two capability traits isolate the core from the outside world:
//! [`DeviceLink`] for the BLE side and [`Publisher`] for the MQTT side.
//! Concrete implementations live in [`ble`] and [`mqtt`]; test doubles live in
//! `crate::testing`.

use std::time::Duration;
use uuid::Uuid;

pub mod ble;
pub mod mqtt;

/// A GATT descriptor found during service discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattDescriptor {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
}

/// A discovered GATT service with the descriptors of all its characteristics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub descriptors: Vec<GattDescriptor>,
}

impl GattService {
    /// Descriptors whose UUID string starts with `prefix` (case-insensitive)
    pub fn descriptors_with_prefix<'a>(
        &'a self,
        prefix: &str,
    ) -> impl Iterator<Item = &'a GattDescriptor> + 'a {
        let prefix = prefix.to_ascii_lowercase();
        self.descriptors
            .iter()
            .filter(move |d| d.uuid.to_string().starts_with(&prefix))
    }
}

/// BLE capability consumed by the link manager
///
/// Notification delivery is modelled as a bounded wait rather than a
/// callback: `wait_for_notification` always returns within `timeout`.
#[async_trait::async_trait]
pub trait DeviceLink: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the peripheral with the given MAC address
    async fn connect(&mut self, address: &str) -> Result<(), Self::Error>;

    /// Drop the link; a no-op when not connected
    ///
    /// Also tears down whatever a failed or cancelled `connect` left behind,
    /// such as a running scan or a link whose setup never finished.
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Look up a discovered service by UUID
    async fn find_service(&mut self, uuid: Uuid) -> Result<Option<GattService>, Self::Error>;

    /// Write a descriptor value
    async fn write_descriptor(
        &mut self,
        descriptor: &GattDescriptor,
        value: &[u8],
        with_response: bool,
    ) -> Result<(), Self::Error>;

    /// Wait up to `timeout` for the next notification payload
    async fn wait_for_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, Self::Error>;
}

/// Messaging capability consumed by the classifier
///
/// Publishing is fire-and-forget from the caller's point of view:
/// implementations must not wait for broker acknowledgement.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Publish a payload to a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool)
        -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CCCD_PREFIX, CCCD_UUID, SERVICE_UUID};

    fn descriptor(uuid: Uuid) -> GattDescriptor {
        GattDescriptor {
            uuid,
            service_uuid: SERVICE_UUID,
            characteristic_uuid: Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb),
        }
    }

    #[test]
    fn test_descriptors_with_prefix() {
        let user_description = Uuid::from_u128(0x00002901_0000_1000_8000_00805f9b34fb);
        let service = GattService {
            uuid: SERVICE_UUID,
            descriptors: vec![descriptor(user_description), descriptor(CCCD_UUID)],
        };

        let found: Vec<_> = service.descriptors_with_prefix(CCCD_PREFIX).collect();
        assert_eq!(found, vec![&descriptor(CCCD_UUID)]);

        let upper: Vec<_> = service.descriptors_with_prefix("00002902-0000").collect();
        assert_eq!(upper.len(), 1);
        assert_eq!(service.descriptors_with_prefix("0000abcd").count(), 0);
    }
}
