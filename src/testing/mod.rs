//! Testing utilities and mock implementations
//!
//! Lets the classifier and the link manager run without a broker or a
//! Bluetooth adapter.

pub mod mocks;

pub use mocks::*;
