//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a queue service emulation that:
//! - Creates and resolves queues by name with attribute comparison on re-create
//! - Implements per-message and per-queue delivery delay
//! - Implements visibility timeouts and approximate receive counts
//! - Moves messages to a dead-letter queue following `RedrivePolicy`
//! - Supports long polling
//!
//! This provider is intended for:
//! - Unit and integration testing of consumers and registrars
//! - Local development without a queue service

use crate::client::QueueProvider;
use crate::error::{QueueError, ValidationError};
use crate::message::{
    attribute_names, MessageId, OutgoingMessage, QueueAttributes, QueueName, QueueUrl,
    ReceiptHandle, ReceiveOptions, ReceivedMessage, SendReceipt, Timestamp,
};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

const ACCOUNT_ID: &str = "000000000000";

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    config: InMemoryConfig,
}

impl QueueStorage {
    fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: HashMap::new(),
            config,
        }
    }

    fn queue_by_url(&self, url: &QueueUrl) -> Result<&InMemoryQueue, QueueError> {
        self.queues
            .values()
            .find(|queue| &queue.url == url)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: url.to_string(),
            })
    }

    fn queue_name_by_url(&self, url: &QueueUrl) -> Result<QueueName, QueueError> {
        self.queue_by_url(url).map(|queue| queue.name.clone())
    }

    fn queue_name_by_arn(&self, arn: &str) -> Option<QueueName> {
        self.queues
            .values()
            .find(|queue| queue.arn == arn)
            .map(|queue| queue.name.clone())
    }
}

/// Dead-letter routing of a queue, parsed from its `RedrivePolicy` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
struct RedrivePolicy {
    dead_letter_target_arn: String,
    max_receive_count: u32,
}

impl RedrivePolicy {
    fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = |message: &str| ValidationError::InvalidFormat {
            field: attribute_names::REDRIVE_POLICY.to_string(),
            message: message.to_string(),
        };

        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| invalid(&e.to_string()))?;

        let dead_letter_target_arn = value
            .get("deadLetterTargetArn")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid("deadLetterTargetArn is required"))?
            .to_string();

        // The queue service accepts the count as a string or a number
        let max_receive_count = match value.get("maxReceiveCount") {
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            Some(serde_json::Value::Number(n)) => n.as_u64().map(|n| n as u32),
            _ => None,
        }
        .filter(|count| *count >= 1)
        .ok_or_else(|| invalid("maxReceiveCount must be a positive integer"))?;

        Ok(Self {
            dead_letter_target_arn,
            max_receive_count,
        })
    }
}

/// Internal queue state for a single queue
struct InMemoryQueue {
    name: QueueName,
    url: QueueUrl,
    arn: String,
    attributes: QueueAttributes,
    redrive_policy: Option<RedrivePolicy>,
    /// Messages waiting for delivery (possibly delayed)
    messages: VecDeque<StoredMessage>,
    /// In-flight messages keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
}

impl InMemoryQueue {
    fn new(
        name: QueueName,
        attributes: QueueAttributes,
        redrive_policy: Option<RedrivePolicy>,
    ) -> Self {
        let url = QueueUrl::new(format!("http://localhost/{}/{}", ACCOUNT_ID, name));
        let arn = format!("arn:aws:sqs:local:{}:{}", ACCOUNT_ID, name);

        Self {
            name,
            url,
            arn,
            attributes,
            redrive_policy,
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }

    fn attribute_seconds(&self, name: &str) -> Option<u64> {
        self.attributes.get(name).and_then(|v| v.parse().ok())
    }

    /// Return in-flight messages whose visibility timeout has elapsed
    fn release_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| in_flight.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                self.messages.push_back(in_flight.message);
            }
        }
    }
}

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    deduplication_id: Option<String>,
    receive_count: u32,
    available_at: Instant,
}

/// A message currently hidden by its visibility timeout
struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider implementation
#[derive(Clone)]
pub struct InMemoryProvider {
    storage: Arc<RwLock<QueueStorage>>,
}

impl InMemoryProvider {
    /// Create new in-memory provider with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::new(config))),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, QueueStorage>, QueueError> {
        self.storage.read().map_err(|_| Self::poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, QueueStorage>, QueueError> {
        self.storage.write().map_err(|_| Self::poisoned())
    }

    fn poisoned() -> QueueError {
        QueueError::ProviderError {
            provider: ProviderType::InMemory.to_string(),
            code: "StoragePoisoned".to_string(),
            message: "queue storage lock was poisoned".to_string(),
        }
    }

    /// Names of all queues created so far
    pub fn queue_names(&self) -> Vec<String> {
        self.read()
            .map(|storage| {
                let mut names: Vec<String> = storage
                    .queues
                    .keys()
                    .map(|name| name.as_str().to_string())
                    .collect();
                names.sort();
                names
            })
            .unwrap_or_default()
    }

    /// Attributes a queue was created with
    pub fn queue_attributes(&self, queue: &str) -> Option<QueueAttributes> {
        let storage = self.read().ok()?;
        storage
            .queues
            .values()
            .find(|q| q.name.as_str() == queue)
            .map(|q| q.attributes.clone())
    }

    /// Number of messages waiting in a queue, including delayed ones
    pub fn approximate_message_count(&self, queue: &str) -> usize {
        self.read()
            .ok()
            .and_then(|storage| {
                storage
                    .queues
                    .values()
                    .find(|q| q.name.as_str() == queue)
                    .map(|q| q.messages.len())
            })
            .unwrap_or(0)
    }

    /// Number of messages currently received but not yet deleted
    pub fn in_flight_count(&self, queue: &str) -> usize {
        self.read()
            .ok()
            .and_then(|storage| {
                storage
                    .queues
                    .values()
                    .find(|q| q.name.as_str() == queue)
                    .map(|q| q.in_flight.len())
            })
            .unwrap_or(0)
    }

    /// Bodies of the messages waiting in a queue, oldest first
    pub fn peek_bodies(&self, queue: &str) -> Vec<String> {
        self.read()
            .ok()
            .and_then(|storage| {
                storage
                    .queues
                    .values()
                    .find(|q| q.name.as_str() == queue)
                    .map(|q| q.messages.iter().map(|m| m.body.clone()).collect())
            })
            .unwrap_or_default()
    }

    /// Single non-blocking receive attempt
    fn try_receive(
        &self,
        queue_url: &QueueUrl,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut storage = self.write()?;
        let now = Instant::now();
        let default_visibility = storage.config.default_visibility_timeout;
        let queue_name = storage.queue_name_by_url(queue_url)?;

        // Collect redrive moves first; the dead-letter queue is a separate entry
        let mut redriven: Vec<(String, StoredMessage)> = Vec::new();
        let mut delivered = Vec::new();

        {
            let queue = storage
                .queues
                .get_mut(&queue_name)
                .ok_or_else(|| QueueError::QueueNotFound {
                    queue_name: queue_name.to_string(),
                })?;
            queue.release_expired(now);

            let visibility = options
                .visibility_timeout
                .or_else(|| {
                    queue
                        .attribute_seconds(attribute_names::VISIBILITY_TIMEOUT)
                        .map(Duration::from_secs)
                })
                .unwrap_or(default_visibility);
            let max_messages = options.max_messages.clamp(1, 10) as usize;
            let return_all = options.attribute_names.iter().any(|n| n == "All");
            let wants = |name: &str| return_all || options.attribute_names.iter().any(|n| n == name);

            let mut remaining = VecDeque::with_capacity(queue.messages.len());
            while let Some(mut message) = queue.messages.pop_front() {
                if delivered.len() >= max_messages || message.available_at > now {
                    remaining.push_back(message);
                    continue;
                }

                if let Some(policy) = &queue.redrive_policy {
                    if message.receive_count >= policy.max_receive_count {
                        redriven.push((policy.dead_letter_target_arn.clone(), message));
                        continue;
                    }
                }

                message.receive_count += 1;
                let receipt = uuid::Uuid::new_v4().to_string();

                let mut attributes = HashMap::new();
                if wants(attribute_names::APPROXIMATE_RECEIVE_COUNT) {
                    attributes.insert(
                        attribute_names::APPROXIMATE_RECEIVE_COUNT.to_string(),
                        message.receive_count.to_string(),
                    );
                }
                if let Some(dedup_id) = &message.deduplication_id {
                    if wants(attribute_names::MESSAGE_DEDUPLICATION_ID) {
                        attributes.insert(
                            attribute_names::MESSAGE_DEDUPLICATION_ID.to_string(),
                            dedup_id.clone(),
                        );
                    }
                }

                delivered.push(ReceivedMessage {
                    message_id: message.message_id.clone(),
                    body: message.body.clone(),
                    receipt_handle: Some(ReceiptHandle::new(receipt.clone())),
                    attributes,
                    message_attributes: HashMap::new(),
                    received_at: Timestamp::now(),
                });

                queue.in_flight.insert(
                    receipt,
                    InFlightMessage {
                        message,
                        visible_at: now + visibility,
                    },
                );
            }
            queue.messages = remaining;
        }

        for (arn, mut message) in redriven {
            match storage.queue_name_by_arn(&arn) {
                Some(dlq_name) => {
                    debug!(
                        queue = %queue_name,
                        dead_letter_queue = %dlq_name,
                        message_id = %message.message_id,
                        "Redriving message to dead-letter queue"
                    );
                    message.receive_count = 0;
                    message.available_at = now;
                    if let Some(dlq) = storage.queues.get_mut(&dlq_name) {
                        dlq.messages.push_back(message);
                    }
                }
                None => {
                    debug!(
                        queue = %queue_name,
                        target_arn = %arn,
                        message_id = %message.message_id,
                        "Dead-letter target missing; dropping message"
                    );
                }
            }
        }

        Ok(delivered)
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueProvider for InMemoryProvider {
    async fn get_queue_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError> {
        let storage = self.read()?;
        storage
            .queues
            .get(queue)
            .map(|q| q.url.clone())
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })
    }

    async fn create_queue(
        &self,
        queue: &QueueName,
        attributes: &QueueAttributes,
    ) -> Result<QueueUrl, QueueError> {
        let mut storage = self.write()?;

        if let Some(existing) = storage.queues.get(queue) {
            // Re-creating with identical attributes is idempotent
            if &existing.attributes == attributes {
                return Ok(existing.url.clone());
            }
            return Err(QueueError::QueueAlreadyExists {
                queue_name: queue.to_string(),
            });
        }

        let redrive_policy = attributes
            .get(attribute_names::REDRIVE_POLICY)
            .map(|raw| RedrivePolicy::parse(raw))
            .transpose()?;

        if let Some(policy) = &redrive_policy {
            if storage
                .queue_name_by_arn(&policy.dead_letter_target_arn)
                .is_none()
            {
                return Err(ValidationError::InvalidFormat {
                    field: attribute_names::REDRIVE_POLICY.to_string(),
                    message: format!(
                        "dead-letter target {} does not exist",
                        policy.dead_letter_target_arn
                    ),
                }
                .into());
            }
        }

        let created = InMemoryQueue::new(queue.clone(), attributes.clone(), redrive_policy);
        let url = created.url.clone();
        storage.queues.insert(queue.clone(), created);

        debug!(queue = %queue, url = %url, "Created in-memory queue");
        Ok(url)
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &QueueUrl,
        attribute_names: &[&str],
    ) -> Result<HashMap<String, String>, QueueError> {
        let storage = self.read()?;
        let queue = storage.queue_by_url(queue_url)?;

        let mut all = queue.attributes.clone();
        all.insert(attribute_names::QUEUE_ARN.to_string(), queue.arn.clone());
        all.insert(
            "ApproximateNumberOfMessages".to_string(),
            queue.messages.len().to_string(),
        );
        all.insert(
            "ApproximateNumberOfMessagesNotVisible".to_string(),
            queue.in_flight.len().to_string(),
        );

        if attribute_names.contains(&"All") {
            return Ok(all);
        }

        Ok(all
            .into_iter()
            .filter(|(name, _)| attribute_names.contains(&name.as_str()))
            .collect())
    }

    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: &OutgoingMessage,
    ) -> Result<SendReceipt, QueueError> {
        let max_size = ProviderType::InMemory.max_message_size();
        if message.body.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: message.body.len(),
                max_size,
            });
        }

        let mut storage = self.write()?;
        let max_queue_size = storage.config.max_queue_size;
        let queue_name = storage.queue_name_by_url(queue_url)?;
        let queue = storage
            .queues
            .get_mut(&queue_name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue_name.to_string(),
            })?;

        if queue.messages.len() + queue.in_flight.len() >= max_queue_size {
            return Err(QueueError::ProviderError {
                provider: ProviderType::InMemory.to_string(),
                code: "QueueFull".to_string(),
                message: format!("queue {} holds {} messages", queue_name, max_queue_size),
            });
        }

        let delay = message
            .delay_seconds
            .map(u64::from)
            .or_else(|| queue.attribute_seconds(attribute_names::DELAY_SECONDS))
            .unwrap_or(0);

        let message_id = MessageId::new();
        queue.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            body: message.body.clone(),
            deduplication_id: message.deduplication_id.clone(),
            receive_count: 0,
            available_at: Instant::now() + Duration::from_secs(delay),
        });

        Ok(SendReceipt {
            message_id,
            md5_of_body: None,
        })
    }

    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let poll_interval = self.read()?.config.poll_interval;
        let deadline = Instant::now() + options.wait_time.min(Duration::from_secs(20));

        loop {
            let messages = self.try_receive(queue_url, options)?;
            if !messages.is_empty() || Instant::now() >= deadline {
                return Ok(messages);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut storage = self.write()?;
        let queue_name = storage.queue_name_by_url(queue_url)?;
        let queue = storage
            .queues
            .get_mut(&queue_name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue_name.to_string(),
            })?;

        match queue.in_flight.remove(receipt.as_str()) {
            Some(_) => Ok(()),
            None => Err(QueueError::MessageNotFound {
                receipt: receipt.as_str().to_string(),
            }),
        }
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
