//! Turns decoded frames into published readings and operating state
//!
//! The classifier is the only component that talks to the [`Publisher`]
//! during a session. It never fails: publish errors are logged and dropped,
//! since a reading that missed the bus is stale by the next frame anyway.

use super::state::OperatingState;
use crate::config::TimingSection;
use crate::link::DeviceSession;
use crate::protocol::{Channel, Frame, TopicMap, VitalReading, WaveformSample};
use crate::transport::Publisher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the link manager should do after a frame or idle cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep polling
    Continue,
    /// Device has been silent for too long; drop the link
    InactivityTimeout,
}

/// When to give up on a silent device and how long to back off afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactivityPolicy {
    /// Consecutive empty poll cycles that trip the timeout
    pub threshold: u32,
    /// Backoff used once after the timeout trips
    pub delay: Duration,
}

impl InactivityPolicy {
    pub fn from_timing(timing: &TimingSection) -> Self {
        Self {
            threshold: timing.inactivity_threshold(),
            delay: timing.inactivity_delay(),
        }
    }
}

/// Resolve the operating state for a vital-signs frame (pure function)
///
/// Out-of-range values are what the device sends while settling.
pub fn classify(reading: &VitalReading) -> OperatingState {
    if reading.spo2 > 100 || reading.bpm > 200 {
        OperatingState::Calibrating
    } else if reading.spo2 <= 100 && reading.bpm <= 200 {
        OperatingState::Reading
    } else {
        OperatingState::Off
    }
}

/// Perfusion index payload, always with one decimal
pub fn format_perfusion_index(reading: &VitalReading) -> String {
    format!("{:.1}", reading.perfusion_index())
}

/// Waveform payload as a JSON array of integers
pub fn format_waveform(sample: &WaveformSample) -> String {
    let values: Vec<u16> = sample.samples.iter().map(|&b| u16::from(b)).collect();
    serde_json::Value::from(values).to_string()
}

pub struct ReadingClassifier<P: Publisher + ?Sized> {
    publisher: Arc<P>,
    topics: TopicMap,
    state: OperatingState,
    policy: InactivityPolicy,
}

impl<P: Publisher + ?Sized> ReadingClassifier<P> {
    pub fn new(publisher: Arc<P>, topics: TopicMap, policy: InactivityPolicy) -> Self {
        Self {
            publisher,
            topics,
            state: OperatingState::Off,
            policy,
        }
    }

    /// Last state announced on the bus
    pub fn state(&self) -> OperatingState {
        self.state
    }

    pub fn policy(&self) -> InactivityPolicy {
        self.policy
    }

    /// Route one decoded frame
    pub async fn handle_frame(&mut self, frame: &Frame, session: &mut DeviceSession) -> Verdict {
        match frame {
            Frame::Vital(reading) => {
                session.reset_inactivity();
                self.handle_vital(reading).await;
                self.check_inactivity(session).await
            }
            Frame::Waveform(sample) => {
                session.reset_inactivity();
                self.emit(Channel::Ppg, format_waveform(sample)).await;
                Verdict::Continue
            }
            Frame::Ignored => Verdict::Continue,
        }
    }

    /// Account for a poll cycle that produced no frame
    pub async fn record_idle_cycle(&mut self, session: &mut DeviceSession) -> Verdict {
        let count = session.record_idle();
        debug!(count, threshold = self.policy.threshold, "No notification this cycle");
        self.check_inactivity(session).await
    }

    async fn handle_vital(&mut self, reading: &VitalReading) {
        let state = classify(reading);
        if state == OperatingState::Reading {
            self.emit(Channel::Spo2, reading.spo2.to_string()).await;
            self.emit(Channel::Bpm, reading.bpm.to_string()).await;
            self.emit(Channel::PerfusionIndex, format_perfusion_index(reading))
                .await;
        }
        if state != self.state {
            info!(from = %self.state, to = %state, "Sensor state changed");
        }
        self.announce(state).await;
    }

    async fn check_inactivity(&mut self, session: &mut DeviceSession) -> Verdict {
        if session.inactivity_count() < self.policy.threshold {
            return Verdict::Continue;
        }

        warn!(
            cycles = session.inactivity_count(),
            "Device inactive, disconnecting for {:?}", self.policy.delay
        );
        self.announce(OperatingState::Reconnecting).await;
        session.defer_next_reconnect(self.policy.delay);
        session.reset_inactivity();
        Verdict::InactivityTimeout
    }

    /// Publish the status and availability pair for `state`
    pub async fn announce(&mut self, state: OperatingState) {
        self.state = state;
        self.emit(Channel::Status, state.label()).await;
        self.emit(Channel::Availability, state.availability()).await;
    }

    /// Reset the bus to "no data": state Off and every value topic cleared.
    ///
    /// Safe to call any number of times; each call publishes the same set.
    pub async fn flush(&mut self) {
        self.announce(OperatingState::Off).await;
        for channel in [
            Channel::Spo2,
            Channel::Bpm,
            Channel::PerfusionIndex,
            Channel::Ppg,
        ] {
            self.emit(channel, "").await;
        }
    }

    async fn emit(&self, channel: Channel, payload: impl Into<String>) {
        let topic = self.topics.topic(channel);
        let payload: String = payload.into();
        if let Err(e) = self
            .publisher
            .publish(topic, payload.into_bytes(), false)
            .await
        {
            warn!(%channel, "Publish to {} failed: {}", topic, e);
        }
    }
}
