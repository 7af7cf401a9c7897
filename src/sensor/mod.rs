//! Reading classification and operating state
//!
//! - [`state`] - the four operating states and their bus payloads
//! - [`classifier`] - frame handling, publishing and the inactivity policy

pub mod classifier;
pub mod state;

pub use classifier::{classify, InactivityPolicy, ReadingClassifier, Verdict};
pub use state::OperatingState;
