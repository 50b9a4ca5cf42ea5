//! Tests for the in-memory queue provider.

use super::*;

fn queue_name(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

fn immediate() -> ReceiveOptions {
    ReceiveOptions {
        wait_time: Duration::ZERO,
        ..Default::default()
    }
}

/// Receive options that make messages visible again straight away
fn immediate_redelivery() -> ReceiveOptions {
    ReceiveOptions {
        visibility_timeout: Some(Duration::ZERO),
        ..immediate()
    }
}

async fn create(provider: &InMemoryProvider, name: &str) -> QueueUrl {
    provider
        .create_queue(&queue_name(name), &QueueAttributes::new())
        .await
        .unwrap()
}

// ============================================================================
// Queue Management
// ============================================================================

mod queue_management {
    use super::*;

    #[tokio::test]
    async fn test_get_queue_url_for_missing_queue_is_not_found() {
        let provider = InMemoryProvider::default();

        let err = provider
            .get_queue_url(&queue_name("missing"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_then_resolve_returns_same_url() {
        let provider = InMemoryProvider::default();

        let created = create(&provider, "orders").await;
        let resolved = provider.get_queue_url(&queue_name("orders")).await.unwrap();

        assert_eq!(created, resolved);
        assert_eq!(
            created.as_str(),
            "http://localhost/000000000000/orders"
        );
    }

    #[tokio::test]
    async fn test_create_with_identical_attributes_is_idempotent() {
        let provider = InMemoryProvider::default();
        let mut attributes = QueueAttributes::new();
        attributes.insert("DelaySeconds".to_string(), "5".to_string());

        let first = provider
            .create_queue(&queue_name("orders"), &attributes)
            .await
            .unwrap();
        let second = provider
            .create_queue(&queue_name("orders"), &attributes)
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_create_with_different_attributes_reports_already_exists() {
        let provider = InMemoryProvider::default();
        create(&provider, "orders").await;

        let mut attributes = QueueAttributes::new();
        attributes.insert("DelaySeconds".to_string(), "5".to_string());
        let err = provider
            .create_queue(&queue_name("orders"), &attributes)
            .await
            .unwrap_err();

        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_redrive_policy_requires_existing_target() {
        let provider = InMemoryProvider::default();
        let mut attributes = QueueAttributes::new();
        attributes.insert(
            "RedrivePolicy".to_string(),
            r#"{"deadLetterTargetArn":"arn:aws:sqs:local:000000000000:nope","maxReceiveCount":"5"}"#
                .to_string(),
        );

        let err = provider
            .create_queue(&queue_name("orders"), &attributes)
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_queue_arn_is_reported() {
        let provider = InMemoryProvider::default();
        let url = create(&provider, "orders-dl").await;

        let attributes = provider
            .get_queue_attributes(&url, &["QueueArn"])
            .await
            .unwrap();

        assert_eq!(attributes.len(), 1);
        assert_eq!(
            attributes.get("QueueArn").map(String::as_str),
            Some("arn:aws:sqs:local:000000000000:orders-dl")
        );
    }
}

// ============================================================================
// Message Operations
// ============================================================================

mod message_operations {
    use super::*;

    #[tokio::test]
    async fn test_send_receive_delete() {
        let provider = InMemoryProvider::default();
        let url = create(&provider, "orders").await;

        provider
            .send_message(&url, &OutgoingMessage::new(r#"{"id":1}"#))
            .await
            .unwrap();

        let received = provider.receive_messages(&url, &immediate()).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, r#"{"id":1}"#);
        assert_eq!(received[0].receive_count(), 1);
        assert_eq!(provider.in_flight_count("orders"), 1);

        let receipt = received[0].receipt_handle.clone().unwrap();
        provider.delete_message(&url, &receipt).await.unwrap();

        assert_eq!(provider.in_flight_count("orders"), 0);
        assert_eq!(provider.approximate_message_count("orders"), 0);
    }

    #[tokio::test]
    async fn test_deleting_unknown_receipt_fails() {
        let provider = InMemoryProvider::default();
        let url = create(&provider, "orders").await;

        let err = provider
            .delete_message(&url, &ReceiptHandle::new("unknown"))
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::MessageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_send_to_unknown_url_fails() {
        let provider = InMemoryProvider::default();

        let err = provider
            .send_message(
                &QueueUrl::new("http://localhost/000000000000/ghost"),
                &OutgoingMessage::new("{}"),
            )
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_in_flight_message_is_hidden_until_visibility_expires() {
        let provider = InMemoryProvider::default();
        let url = create(&provider, "orders").await;
        provider
            .send_message(&url, &OutgoingMessage::new("{}"))
            .await
            .unwrap();

        let first = provider.receive_messages(&url, &immediate()).await.unwrap();
        let second = provider.receive_messages(&url, &immediate()).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_receive_count_increments_on_redelivery() {
        let provider = InMemoryProvider::default();
        let url = create(&provider, "orders").await;
        provider
            .send_message(&url, &OutgoingMessage::new("{}"))
            .await
            .unwrap();

        let options = immediate_redelivery();
        let first = provider.receive_messages(&url, &options).await.unwrap();
        let second = provider.receive_messages(&url, &options).await.unwrap();

        assert_eq!(first[0].receive_count(), 1);
        assert_eq!(second[0].receive_count(), 2);
    }

    #[tokio::test]
    async fn test_delayed_message_is_not_delivered_early() {
        let provider = InMemoryProvider::default();
        let url = create(&provider, "orders").await;

        provider
            .send_message(
                &url,
                &OutgoingMessage::new("{}").with_delay_seconds(Some(60)),
            )
            .await
            .unwrap();

        let received = provider.receive_messages(&url, &immediate()).await.unwrap();
        assert!(received.is_empty());
        assert_eq!(provider.approximate_message_count("orders"), 1);
    }

    #[tokio::test]
    async fn test_deduplication_id_is_returned_when_requested() {
        let provider = InMemoryProvider::default();
        let url = create(&provider, "orders").await;

        provider
            .send_message(
                &url,
                &OutgoingMessage::new("{}").with_deduplication_id(Some("abc".to_string())),
            )
            .await
            .unwrap();

        let received = provider.receive_messages(&url, &immediate()).await.unwrap();
        assert_eq!(received[0].deduplication_id(), Some("abc"));
    }

    #[tokio::test]
    async fn test_max_messages_limits_batch() {
        let provider = InMemoryProvider::default();
        let url = create(&provider, "orders").await;
        for i in 0..5 {
            provider
                .send_message(&url, &OutgoingMessage::new(format!("{{\"n\":{}}}", i)))
                .await
                .unwrap();
        }

        let options = ReceiveOptions {
            max_messages: 3,
            ..immediate()
        };
        let received = provider.receive_messages(&url, &options).await.unwrap();

        assert_eq!(received.len(), 3);
        assert_eq!(received[0].body, r#"{"n":0}"#);
        assert_eq!(provider.approximate_message_count("orders"), 2);
    }

    #[tokio::test]
    async fn test_long_poll_returns_message_sent_while_waiting() {
        let provider = InMemoryProvider::default();
        let url = create(&provider, "orders").await;

        let sender = provider.clone();
        let sender_url = url.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            sender
                .send_message(&sender_url, &OutgoingMessage::new("late"))
                .await
                .unwrap();
        });

        let options = ReceiveOptions {
            wait_time: Duration::from_secs(5),
            ..Default::default()
        };
        let received = provider.receive_messages(&url, &options).await.unwrap();

        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, "late");
    }

    #[tokio::test]
    async fn test_oversized_message_is_rejected() {
        let provider = InMemoryProvider::default();
        let url = create(&provider, "orders").await;

        let err = provider
            .send_message(&url, &OutgoingMessage::new("x".repeat(10 * 1024 * 1024 + 1)))
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::MessageTooLarge { .. }));
    }
}

// ============================================================================
// Dead-letter Redrive
// ============================================================================

mod redrive {
    use super::*;

    #[tokio::test]
    async fn test_message_moves_to_dead_letter_after_max_receives() {
        let provider = InMemoryProvider::default();
        let dlq_url = create(&provider, "orders-dl").await;

        let mut attributes = QueueAttributes::new();
        attributes.insert(
            "RedrivePolicy".to_string(),
            r#"{"deadLetterTargetArn":"arn:aws:sqs:local:000000000000:orders-dl","maxReceiveCount":"2"}"#
                .to_string(),
        );
        let url = provider
            .create_queue(&queue_name("orders"), &attributes)
            .await
            .unwrap();

        provider
            .send_message(&url, &OutgoingMessage::new("poison"))
            .await
            .unwrap();

        let options = immediate_redelivery();
        assert_eq!(provider.receive_messages(&url, &options).await.unwrap().len(), 1);
        assert_eq!(provider.receive_messages(&url, &options).await.unwrap().len(), 1);

        // Third attempt exceeds maxReceiveCount
        assert!(provider.receive_messages(&url, &options).await.unwrap().is_empty());
        assert_eq!(provider.approximate_message_count("orders"), 0);

        let dead = provider.receive_messages(&dlq_url, &immediate()).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, "poison");
        assert_eq!(dead[0].receive_count(), 1);
    }

    #[test]
    fn test_redrive_policy_accepts_numeric_count() {
        let policy =
            RedrivePolicy::parse(r#"{"deadLetterTargetArn":"arn","maxReceiveCount":7}"#).unwrap();
        assert_eq!(policy.max_receive_count, 7);
    }

    #[test]
    fn test_redrive_policy_rejects_zero_count() {
        assert!(
            RedrivePolicy::parse(r#"{"deadLetterTargetArn":"arn","maxReceiveCount":"0"}"#).is_err()
        );
    }
}
