//! Tests for logging configuration parsing
//!
//! Only the pure parsing helpers are covered; installing the global
//! subscriber is left to the binary.

use pulseox_bridge::observability::logging::{parse_level, parse_span_flag, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_is_case_insensitive() {
    assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
    assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("cOmPaCt"), LogFormat::Compact);
}

#[test]
fn test_log_format_unknown_defaults_to_json() {
    for input in ["", "xml", "yaml", "123", "  "] {
        assert_eq!(LogFormat::parse(input), LogFormat::Json, "input: {input:?}");
    }
}

#[test]
fn test_log_format_tolerates_whitespace() {
    assert_eq!(LogFormat::parse("  pretty  "), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("compact\n"), LogFormat::Compact);
}

#[test]
fn test_log_level_parsing() {
    assert_eq!(parse_level("error"), Level::ERROR);
    assert_eq!(parse_level("WARN"), Level::WARN);
    assert_eq!(parse_level("trace"), Level::TRACE);
    assert_eq!(parse_level("loud"), Level::INFO);
}

#[test]
fn test_span_flag_requires_literal_true() {
    assert!(parse_span_flag(" True "));
    assert!(!parse_span_flag("on"));
    assert!(!parse_span_flag("false"));
}

#[test]
fn test_span_macros_build_spans() {
    let link = pulseox_bridge::link_span!(address = "FF:FF:FF:FF:36:12");
    let mqtt = pulseox_bridge::mqtt_span!(broker = "mqtt://localhost");
    let _link = link.enter();
    let _mqtt = mqtt.enter();
    tracing::info!("inside both spans");
}
