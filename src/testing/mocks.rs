//! Mock implementations for testing
//!
//! Provides a recording [`Publisher`] and a scripted [`DeviceLink`] so the
//! classifier and the link manager can be exercised without a broker or a
//! Bluetooth adapter.

use crate::error::BridgeError;
use crate::protocol::{CCCD_UUID, SERVICE_UUID};
use crate::transport::ble::LinkError;
use crate::transport::{DeviceLink, GattDescriptor, GattService, Publisher};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

/// One recorded publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Mock publisher that records every message in order
#[derive(Debug, Default)]
pub struct MockPublisher {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub should_fail: bool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every publish fails and nothing is recorded
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    /// `(topic, payload)` pairs with payloads as UTF-8
    pub async fn published_pairs(&self) -> Vec<(String, String)> {
        self.published_messages
            .lock()
            .await
            .iter()
            .map(|m| (m.topic.clone(), m.payload_str()))
            .collect()
    }

    /// Payloads published to one topic, oldest first
    pub async fn payloads_for(&self, topic: &str) -> Vec<String> {
        self.published_messages
            .lock()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .map(PublishedMessage::payload_str)
            .collect()
    }

    pub async fn clear_history(&self) {
        self.published_messages.lock().await.clear();
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    type Error = BridgeError;

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BridgeError> {
        if self.should_fail {
            return Err(BridgeError::internal_error("Mock publish failure"));
        }
        self.published_messages.lock().await.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }
}

/// Scripted outcome of one `wait_for_notification` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStep {
    /// Delivered to a waiting call (non-zero timeout)
    Frame(Vec<u8>),
    /// Already queued in the transport; also delivered to zero-timeout drains
    Buffered(Vec<u8>),
    /// Nothing arrives; the call sleeps for its full timeout
    Silence,
    /// The wait fails as if the device vanished
    Fail,
}

/// A call made against [`MockLink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    Connect(String),
    Disconnect,
    FindService(Uuid),
    WriteDescriptor(Uuid, Vec<u8>),
    Wait(Duration),
}

#[derive(Debug)]
struct MockLinkState {
    connect_outcomes: VecDeque<bool>,
    failing_setups: u32,
    setup_delay: Duration,
    service: Option<GattService>,
    steps: VecDeque<LinkStep>,
    connected: bool,
    calls: Vec<(LinkCall, Instant)>,
}

/// Scripted BLE link; clones share the same script and call log
#[derive(Debug, Clone)]
pub struct MockLink {
    state: Arc<Mutex<MockLinkState>>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    /// Characteristic carrying the default CCCD
    pub const FIRST_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);
    /// Characteristic added by [`MockLink::with_duplicate_cccd`]
    pub const SECOND_CHARACTERISTIC: Uuid =
        Uuid::from_u128(0x0000fff2_0000_1000_8000_00805f9b34fb);

    /// Connects successfully, exposes the vendor service with one CCCD and
    /// stays silent once the script runs out.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockLinkState {
                connect_outcomes: VecDeque::new(),
                failing_setups: 0,
                setup_delay: Duration::ZERO,
                service: Some(GattService {
                    uuid: SERVICE_UUID,
                    descriptors: vec![Self::cccd(Self::FIRST_CHARACTERISTIC)],
                }),
                steps: VecDeque::new(),
                connected: false,
                calls: Vec::new(),
            })),
        }
    }

    fn cccd(characteristic_uuid: Uuid) -> GattDescriptor {
        GattDescriptor {
            uuid: CCCD_UUID,
            service_uuid: SERVICE_UUID,
            characteristic_uuid,
        }
    }

    fn modify(self, f: impl FnOnce(&mut MockLinkState)) -> Self {
        if let Ok(mut state) = self.state.try_lock() {
            f(&mut state);
        }
        self
    }

    /// Outcomes for successive `connect` calls; `false` fails the attempt
    pub fn with_connect_outcomes(self, outcomes: Vec<bool>) -> Self {
        self.modify(|s| s.connect_outcomes = outcomes.into())
    }

    pub fn with_steps(self, steps: Vec<LinkStep>) -> Self {
        self.modify(|s| s.steps = steps.into())
    }

    /// The next `count` successful connects bring the link up, then fail setup
    pub fn with_failing_setups(self, count: u32) -> Self {
        self.modify(|s| s.failing_setups = count)
    }

    /// Setup after the link comes up takes `delay`
    pub fn with_setup_delay(self, delay: Duration) -> Self {
        self.modify(|s| s.setup_delay = delay)
    }

    pub fn without_service(self) -> Self {
        self.modify(|s| s.service = None)
    }

    /// The service exposes no CCCD at all
    pub fn without_cccd(self) -> Self {
        self.modify(|s| {
            if let Some(service) = s.service.as_mut() {
                service.descriptors.clear();
            }
        })
    }

    /// Add a second characteristic with its own CCCD after the first
    pub fn with_duplicate_cccd(self) -> Self {
        self.modify(|s| {
            if let Some(service) = s.service.as_mut() {
                service
                    .descriptors
                    .push(Self::cccd(Self::SECOND_CHARACTERISTIC));
            }
        })
    }

    pub async fn push_steps(&self, steps: impl IntoIterator<Item = LinkStep>) {
        self.state.lock().await.steps.extend(steps);
    }

    pub async fn calls(&self) -> Vec<LinkCall> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    async fn instants_of(&self, wanted: impl Fn(&LinkCall) -> bool) -> Vec<Instant> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|(call, _)| wanted(call))
            .map(|(_, at)| *at)
            .collect()
    }

    pub async fn connect_instants(&self) -> Vec<Instant> {
        self.instants_of(|c| matches!(c, LinkCall::Connect(_))).await
    }

    pub async fn disconnect_instants(&self) -> Vec<Instant> {
        self.instants_of(|c| matches!(c, LinkCall::Disconnect)).await
    }

    /// Values written to descriptors, oldest first
    pub async fn writes(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|(call, _)| match call {
                LinkCall::WriteDescriptor(_, value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn remaining_steps(&self) -> usize {
        self.state.lock().await.steps.len()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    async fn record(&self, call: LinkCall) {
        self.state.lock().await.calls.push((call, Instant::now()));
    }
}

#[async_trait]
impl DeviceLink for MockLink {
    type Error = LinkError;

    async fn connect(&mut self, address: &str) -> Result<(), LinkError> {
        self.record(LinkCall::Connect(address.to_string())).await;
        let setup_delay = {
            let mut state = self.state.lock().await;
            if !state.connect_outcomes.pop_front().unwrap_or(true) {
                return Err(LinkError::DeviceNotFound(address.to_string()));
            }
            state.connected = true;
            if state.failing_setups > 0 {
                state.failing_setups -= 1;
                return Err(LinkError::NotificationStreamClosed);
            }
            state.setup_delay
        };

        if !setup_delay.is_zero() {
            tokio::time::sleep(setup_delay).await;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.record(LinkCall::Disconnect).await;
        self.state.lock().await.connected = false;
        Ok(())
    }

    async fn find_service(&mut self, uuid: Uuid) -> Result<Option<GattService>, LinkError> {
        self.record(LinkCall::FindService(uuid)).await;
        let state = self.state.lock().await;
        Ok(state.service.clone().filter(|s| s.uuid == uuid))
    }

    async fn write_descriptor(
        &mut self,
        descriptor: &GattDescriptor,
        value: &[u8],
        _with_response: bool,
    ) -> Result<(), LinkError> {
        self.record(LinkCall::WriteDescriptor(descriptor.uuid, value.to_vec()))
            .await;
        Ok(())
    }

    async fn wait_for_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, LinkError> {
        self.record(LinkCall::Wait(timeout)).await;

        let step = {
            let mut state = self.state.lock().await;
            let next = state.steps.front().cloned().unwrap_or(LinkStep::Silence);
            if matches!(next, LinkStep::Buffered(_)) || !timeout.is_zero() {
                state.steps.pop_front();
                Some(next)
            } else {
                None
            }
        };

        match step {
            Some(LinkStep::Frame(raw)) | Some(LinkStep::Buffered(raw)) => Ok(Some(raw)),
            Some(LinkStep::Fail) => Err(LinkError::NotificationStreamClosed),
            Some(LinkStep::Silence) => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_publisher_records_in_order() {
        let publisher = MockPublisher::new();
        publisher.publish("a", b"1".to_vec(), false).await.unwrap();
        publisher.publish("b", b"2".to_vec(), true).await.unwrap();

        let messages = publisher.get_published_messages().await;
        assert_eq!(messages.len(), 2);
        assert!(messages[1].retain);
        assert_eq!(publisher.payloads_for("a").await, vec!["1"]);

        publisher.clear_history().await;
        assert!(publisher.get_published_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_publisher_failure() {
        let publisher = MockPublisher::with_failure();
        assert!(publisher.publish("a", vec![], false).await.is_err());
        assert!(publisher.get_published_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_link_zero_timeout_only_takes_buffered() {
        let mut link = MockLink::new().with_steps(vec![
            LinkStep::Frame(vec![1]),
            LinkStep::Buffered(vec![2]),
        ]);

        assert_eq!(link.wait_for_notification(Duration::ZERO).await.unwrap(), None);
        assert_eq!(
            link.wait_for_notification(Duration::from_millis(1)).await.unwrap(),
            Some(vec![1])
        );
        assert_eq!(
            link.wait_for_notification(Duration::ZERO).await.unwrap(),
            Some(vec![2])
        );
        assert_eq!(link.remaining_steps().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_link_silence_waits_full_timeout() {
        let mut link = MockLink::new();
        let started = Instant::now();
        assert_eq!(
            link.wait_for_notification(Duration::from_secs(1)).await.unwrap(),
            None
        );
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_mock_link_failing_setup_leaves_link_up() {
        let mut link = MockLink::new().with_failing_setups(1);
        assert!(link.connect("FF:FF:FF:FF:36:12").await.is_err());
        assert!(link.is_connected().await);
        link.disconnect().await.unwrap();
        assert!(!link.is_connected().await);
        assert!(link.connect("FF:FF:FF:FF:36:12").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_link_connect_outcomes() {
        let mut link = MockLink::new().with_connect_outcomes(vec![false, true]);
        assert!(link.connect("FF:FF:FF:FF:36:12").await.is_err());
        assert!(!link.is_connected().await);
        assert!(link.connect("FF:FF:FF:FF:36:12").await.is_ok());
        assert!(link.is_connected().await);
        assert_eq!(link.connect_instants().await.len(), 2);
    }
}
