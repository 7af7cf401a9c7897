//! Home Assistant discovery publishing through the Publisher seam

mod test_helpers;

use pulseox_bridge::protocol::{publish_discovery, TopicMap};
use pulseox_bridge::testing::MockPublisher;
use serde_json::Value;
use test_helpers::*;

#[tokio::test]
async fn test_discovery_messages_are_retained_json() {
    let config = test_config();
    let topics = TopicMap::new(config.host(), &config.mqtt.discovery_prefix);
    let publisher = MockPublisher::new();

    let published = publish_discovery(&publisher, &config, &topics).await.unwrap();

    assert_eq!(published, 5);
    let messages = publisher.get_published_messages().await;
    assert_eq!(messages.len(), 5);
    for message in &messages {
        assert!(message.retain, "{} should be retained", message.topic);
        assert!(message.topic.ends_with("/config"));
        let payload: Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(payload["dev"]["sw"], "test");
        assert_eq!(payload["dev"]["ids"][0], "test-host");
    }

    let ppg: Value = serde_json::from_slice(&messages[4].payload).unwrap();
    assert_eq!(ppg["stat_t"], PPG);
    assert_eq!(ppg["avty_t"], AVAILABILITY);
}

#[tokio::test]
async fn test_discovery_failures_are_counted_not_fatal() {
    let config = test_config();
    let topics = TopicMap::new(config.host(), &config.mqtt.discovery_prefix);
    let publisher = MockPublisher::with_failure();

    let published = publish_discovery(&publisher, &config, &topics).await.unwrap();

    assert_eq!(published, 0);
}
