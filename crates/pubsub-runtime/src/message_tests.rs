//! Tests for message types.

use super::*;

fn received_with_attributes(attributes: &[(&str, &str)]) -> ReceivedMessage {
    ReceivedMessage {
        message_id: MessageId::new(),
        body: r#"{"id":"abc"}"#.to_string(),
        receipt_handle: Some(ReceiptHandle::new("receipt-1")),
        attributes: attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        message_attributes: HashMap::new(),
        received_at: Timestamp::now(),
    }
}

#[test]
fn test_queue_name_validation() {
    assert!(QueueName::new("orders".to_string()).is_ok());
    assert!(QueueName::new("orders-dev-dl".to_string()).is_ok());
    assert!(QueueName::new("queue_123".to_string()).is_ok());
    assert!(QueueName::new("events.fifo".to_string()).is_ok());

    assert!(QueueName::new("".to_string()).is_err());
    assert!(QueueName::new("a".repeat(81)).is_err());
    assert!(QueueName::new("special@chars".to_string()).is_err());
    assert!(QueueName::new(".fifo".to_string()).is_err());
}

#[test]
fn test_message_id_generation() {
    let id1 = MessageId::new();
    let id2 = MessageId::new();
    assert_ne!(id1, id2);
    assert!(!id1.as_str().is_empty());
    assert!("".parse::<MessageId>().is_err());
}

#[test]
fn test_receive_count_defaults_to_one_when_absent() {
    let message = received_with_attributes(&[]);
    assert_eq!(message.receive_count(), 1);
}

#[test]
fn test_receive_count_reads_attribute() {
    let message =
        received_with_attributes(&[(attribute_names::APPROXIMATE_RECEIVE_COUNT, "4")]);
    assert_eq!(message.receive_count(), 4);
}

#[test]
fn test_receive_count_ignores_garbage() {
    let message =
        received_with_attributes(&[(attribute_names::APPROXIMATE_RECEIVE_COUNT, "many")]);
    assert_eq!(message.receive_count(), 1);
}

#[test]
fn test_deduplication_id_is_exposed() {
    let message =
        received_with_attributes(&[(attribute_names::MESSAGE_DEDUPLICATION_ID, "abc")]);
    assert_eq!(message.deduplication_id(), Some("abc"));
}

#[test]
fn test_outgoing_message_builder() {
    let message = OutgoingMessage::new("body")
        .with_delay_seconds(Some(30))
        .with_deduplication_id(Some("dedupe".to_string()));

    assert_eq!(message.body, "body");
    assert_eq!(message.delay_seconds, Some(30));
    assert_eq!(message.deduplication_id.as_deref(), Some("dedupe"));
}

#[test]
fn test_default_receive_options_request_receive_count_and_dedupe_id() {
    let options = ReceiveOptions::default();
    assert_eq!(options.max_messages, 1);
    assert!(options
        .attribute_names
        .contains(&attribute_names::APPROXIMATE_RECEIVE_COUNT.to_string()));
    assert!(options
        .attribute_names
        .contains(&attribute_names::MESSAGE_DEDUPLICATION_ID.to_string()));
}
