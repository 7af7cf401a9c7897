//! BLE link supervision
//!
//! [`LinkManager`] owns the connect/discover/poll/backoff loop; the
//! [`DeviceSession`] it carries is lent to the classifier so inactivity and
//! reconnect delays live in one place.

pub mod manager;
pub mod session;

pub use manager::{CycleError, LinkManager, MAX_FRAMES_PER_CYCLE};
pub use session::{DeviceSession, LinkState};
