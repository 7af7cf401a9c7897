//! Per-device session state shared between the link manager and the classifier

use std::fmt;
use std::time::Duration;

/// Where the link manager is in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Discovering,
    Subscribed,
    Polling,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Discovering => "discovering",
            LinkState::Subscribed => "subscribed",
            LinkState::Polling => "polling",
        };
        f.write_str(name)
    }
}

/// Mutable state of the single supervised device
///
/// Owned by [`LinkManager`](super::LinkManager) and lent to the classifier
/// for the duration of one frame or idle cycle.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    address: String,
    link_state: LinkState,
    inactivity_count: u32,
    default_reconnect_delay: Duration,
    next_reconnect_delay: Duration,
}

impl DeviceSession {
    pub fn new(address: impl Into<String>, default_reconnect_delay: Duration) -> Self {
        Self {
            address: address.into(),
            link_state: LinkState::Disconnected,
            inactivity_count: 0,
            default_reconnect_delay,
            next_reconnect_delay: default_reconnect_delay,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn set_link_state(&mut self, state: LinkState) {
        self.link_state = state;
    }

    /// Re-enter the session for a fresh connection attempt
    pub fn begin_attempt(&mut self) {
        self.inactivity_count = 0;
        self.link_state = LinkState::Connecting;
    }

    pub fn inactivity_count(&self) -> u32 {
        self.inactivity_count
    }

    /// Count one poll cycle without frames, returning the new count
    pub fn record_idle(&mut self) -> u32 {
        self.inactivity_count = self.inactivity_count.saturating_add(1);
        self.inactivity_count
    }

    pub fn reset_inactivity(&mut self) {
        self.inactivity_count = 0;
    }

    /// Use `delay` for the next backoff only
    pub fn defer_next_reconnect(&mut self, delay: Duration) {
        self.next_reconnect_delay = delay;
    }

    pub fn next_reconnect_delay(&self) -> Duration {
        self.next_reconnect_delay
    }

    /// Return the pending backoff and restore the default for the cycle after
    pub fn take_reconnect_delay(&mut self) -> Duration {
        std::mem::replace(&mut self.next_reconnect_delay, self.default_reconnect_delay)
    }
}
