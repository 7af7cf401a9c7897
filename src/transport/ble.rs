//! btleplug-backed [`DeviceLink`]
//!
//! Connects by scanning for the configured MAC, then exposes the discovered
//! GATT tree as plain [`GattService`] values. CCCD writes are translated to
//! btleplug subscribe/unsubscribe calls because BlueZ refuses raw writes to
//! the client configuration descriptor. Every enable write is forwarded as a
//! fresh subscribe, so the subscription is re-asserted on each poll cycle.

use super::{DeviceLink, GattDescriptor, GattService};
use crate::protocol::{CCCD_UUID, DISABLE_NOTIFICATIONS};
use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use std::collections::HashSet;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How often the peripheral list is checked while scanning
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),
    #[error("No Bluetooth adapter at index {0}")]
    AdapterNotFound(usize),
    #[error("Device {0} not found during scan")]
    DeviceNotFound(String),
    #[error("Invalid device address: {0}")]
    InvalidAddress(String),
    #[error("Not connected to a device")]
    NotConnected,
    #[error("Notification stream closed by the device")]
    NotificationStreamClosed,
    #[error("Characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
}

/// Link to a single peripheral through a host Bluetooth adapter
pub struct BtleplugLink {
    adapter: Adapter,
    scan_timeout: Duration,
    peripheral: Option<Peripheral>,
    notifications: Option<NotificationStream>,
    subscribed: HashSet<Uuid>,
    scanning: bool,
}

impl BtleplugLink {
    /// Open the adapter at `adapter_index` (0 is the first one BlueZ reports)
    pub async fn new(adapter_index: usize, scan_timeout: Duration) -> Result<Self, LinkError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .nth(adapter_index)
            .ok_or(LinkError::AdapterNotFound(adapter_index))?;

        match adapter.adapter_info().await {
            Ok(info) => info!("Using Bluetooth adapter {}", info),
            Err(e) => debug!("Adapter info unavailable: {}", e),
        }

        Ok(Self {
            adapter,
            scan_timeout,
            peripheral: None,
            notifications: None,
            subscribed: HashSet::new(),
            scanning: false,
        })
    }

    /// Scan until `address` shows up; takes the adapter alone so the future stays `Send`
    ///
    /// `scanning` stays set if the future is dropped mid-scan, which lets
    /// [`DeviceLink::disconnect`] stop the scan afterwards.
    async fn scan_for(
        adapter: &Adapter,
        scan_timeout: Duration,
        address: BDAddr,
        scanning: &mut bool,
    ) -> Result<Peripheral, LinkError> {
        *scanning = true;
        adapter.start_scan(ScanFilter::default()).await?;

        let found = tokio::time::timeout(scan_timeout, async {
            loop {
                for peripheral in adapter.peripherals().await? {
                    if peripheral.address() == address {
                        return Ok::<_, LinkError>(peripheral);
                    }
                }
                tokio::time::sleep(SCAN_POLL_INTERVAL).await;
            }
        })
        .await;

        Self::stop_scan(adapter, scanning).await;

        match found {
            Ok(result) => result,
            Err(_) => Err(LinkError::DeviceNotFound(address.to_string())),
        }
    }

    async fn stop_scan(adapter: &Adapter, scanning: &mut bool) {
        if let Err(e) = adapter.stop_scan().await {
            debug!("Failed to stop scan: {}", e);
        }
        *scanning = false;
    }

    fn connected_peripheral(&self) -> Result<&Peripheral, LinkError> {
        self.peripheral.as_ref().ok_or(LinkError::NotConnected)
    }

    fn characteristic_for(&self, descriptor: &GattDescriptor) -> Result<Characteristic, LinkError> {
        self.connected_peripheral()?
            .characteristics()
            .into_iter()
            .find(|c| {
                c.uuid == descriptor.characteristic_uuid && c.service_uuid == descriptor.service_uuid
            })
            .ok_or(LinkError::CharacteristicNotFound(descriptor.characteristic_uuid))
    }
}

/// Outcome of a subscribe that re-asserts notifications.
///
/// Some backends reject a second subscribe while notifications are already
/// on ("In Progress" on BlueZ). That rejection is fine for a characteristic
/// subscribed earlier on this connection; losing the device is not.
fn settle_subscribe(
    result: Result<(), btleplug::Error>,
    already_subscribed: bool,
) -> Result<(), LinkError> {
    match result {
        Ok(()) => Ok(()),
        Err(e @ (btleplug::Error::NotConnected | btleplug::Error::DeviceNotFound)) => Err(e.into()),
        Err(e) if already_subscribed => {
            debug!("Subscription already active: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Flatten btleplug's service tree into descriptor lists
fn to_gatt_service(service: &btleplug::api::Service) -> GattService {
    GattService {
        uuid: service.uuid,
        descriptors: service
            .characteristics
            .iter()
            .flat_map(|c| c.descriptors.iter())
            .map(|d| GattDescriptor {
                uuid: d.uuid,
                service_uuid: d.service_uuid,
                characteristic_uuid: d.characteristic_uuid,
            })
            .collect(),
    }
}

#[async_trait]
impl DeviceLink for BtleplugLink {
    type Error = LinkError;

    async fn connect(&mut self, address: &str) -> Result<(), LinkError> {
        let address =
            BDAddr::from_str(address).map_err(|_| LinkError::InvalidAddress(address.to_string()))?;

        if self.peripheral.is_some() {
            self.disconnect().await?;
        }

        let peripheral =
            Self::scan_for(&self.adapter, self.scan_timeout, address, &mut self.scanning).await?;

        // Tracked before the link comes up so a failed or cancelled setup is
        // still torn down by `disconnect`
        self.peripheral = Some(peripheral.clone());
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;
        self.notifications = Some(peripheral.notifications().await?);

        info!("Connected to {}", address);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.notifications = None;
        self.subscribed.clear();

        if self.scanning {
            Self::stop_scan(&self.adapter, &mut self.scanning).await;
        }

        if let Some(peripheral) = self.peripheral.take() {
            if peripheral.is_connected().await.unwrap_or(true) {
                peripheral.disconnect().await?;
                info!("Disconnected from {}", peripheral.address());
            }
        }
        Ok(())
    }

    async fn find_service(&mut self, uuid: Uuid) -> Result<Option<GattService>, LinkError> {
        Ok(self
            .connected_peripheral()?
            .services()
            .iter()
            .find(|s| s.uuid == uuid)
            .map(to_gatt_service))
    }

    async fn write_descriptor(
        &mut self,
        descriptor: &GattDescriptor,
        value: &[u8],
        _with_response: bool,
    ) -> Result<(), LinkError> {
        if descriptor.uuid != CCCD_UUID {
            let peripheral = self.connected_peripheral()?;
            let target = peripheral
                .characteristics()
                .into_iter()
                .flat_map(|c| c.descriptors.into_iter())
                .find(|d| {
                    d.uuid == descriptor.uuid
                        && d.characteristic_uuid == descriptor.characteristic_uuid
                })
                .ok_or(LinkError::CharacteristicNotFound(descriptor.characteristic_uuid))?;
            peripheral.write_descriptor(&target, value).await?;
            return Ok(());
        }

        let characteristic = self.characteristic_for(descriptor)?;
        let peripheral = self.peripheral.as_ref().ok_or(LinkError::NotConnected)?;

        if value == DISABLE_NOTIFICATIONS {
            if self.subscribed.remove(&characteristic.uuid) {
                peripheral.unsubscribe(&characteristic).await?;
            }
            return Ok(());
        }

        let already_subscribed = self.subscribed.contains(&characteristic.uuid);
        settle_subscribe(peripheral.subscribe(&characteristic).await, already_subscribed)?;
        debug!("Subscribed to {}", characteristic.uuid);
        self.subscribed.insert(characteristic.uuid);
        Ok(())
    }

    async fn wait_for_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, LinkError> {
        let stream = self.notifications.as_mut().ok_or(LinkError::NotConnected)?;

        let next = tokio::time::timeout(timeout, stream.next()).await;
        match next {
            Ok(Some(notification)) => Ok(Some(notification.value)),
            Ok(None) => {
                warn!("Notification stream ended");
                self.notifications = None;
                Err(LinkError::NotificationStreamClosed)
            }
            Err(_) => Ok(None),
        }
    }
}
