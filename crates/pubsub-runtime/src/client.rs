//! Provider trait and factory for queue operations.

use crate::error::QueueError;
use crate::message::{
    OutgoingMessage, QueueAttributes, QueueName, QueueUrl, ReceiptHandle, ReceiveOptions,
    ReceivedMessage, SendReceipt,
};
use crate::provider::{InMemoryConfig, ProviderConfig, ProviderType};
use crate::providers::{AwsSqsProvider, InMemoryProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Interface implemented by specific queue providers (AWS SQS, in-memory)
///
/// Operations mirror the queue service's own API: queues are created and
/// resolved by name, every message operation addresses a queue by URL.
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Resolve a queue name to its URL
    ///
    /// Returns [`QueueError::QueueNotFound`] when no such queue exists.
    async fn get_queue_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError>;

    /// Create a queue with the given attributes
    ///
    /// Returns [`QueueError::QueueAlreadyExists`] when a queue with that name
    /// exists with different attributes.
    async fn create_queue(
        &self,
        queue: &QueueName,
        attributes: &QueueAttributes,
    ) -> Result<QueueUrl, QueueError>;

    /// Read selected attributes of a queue
    async fn get_queue_attributes(
        &self,
        queue_url: &QueueUrl,
        attribute_names: &[&str],
    ) -> Result<HashMap<String, String>, QueueError>;

    /// Send single message
    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: &OutgoingMessage,
    ) -> Result<SendReceipt, QueueError>;

    /// Long-poll for messages
    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Delete (acknowledge) a received message
    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Factory for creating queue providers from configuration
pub struct QueueProviderFactory;

impl QueueProviderFactory {
    /// Create provider from configuration
    pub async fn create_provider(
        config: ProviderConfig,
    ) -> Result<Arc<dyn QueueProvider>, QueueError> {
        let provider: Arc<dyn QueueProvider> = match config {
            ProviderConfig::InMemory(in_memory_config) => {
                Arc::new(InMemoryProvider::new(in_memory_config))
            }
            ProviderConfig::AwsSqs(aws_config) => Arc::new(
                AwsSqsProvider::new(aws_config)
                    .await
                    .map_err(|e| e.to_queue_error())?,
            ),
        };

        Ok(provider)
    }

    /// Create test provider backed by memory
    pub fn create_test_provider() -> Arc<dyn QueueProvider> {
        Arc::new(InMemoryProvider::new(InMemoryConfig::default()))
    }
}
