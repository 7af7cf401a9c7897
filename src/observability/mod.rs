//! Observability for the bridge: structured logging and span macros

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

pub use logging::{link_span, mqtt_span};
