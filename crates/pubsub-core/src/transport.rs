//! Queue transport client shared by the registrar, the consumers and the
//! publish path.
//!
//! Wraps a [`QueueProvider`] with name-based operations and owns the table
//! of registered queue URLs. Registration writes the table; consumers and
//! publishers only read it.

use crate::settings::QueueDefaults;
use pubsub_runtime::{
    attribute_names, OutgoingMessage, QueueAttributes, QueueError, QueueName, QueueProvider,
    QueueUrl, ReceiptHandle, ReceiveOptions, ReceivedMessage, SendReceipt, SerializationError,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

/// Per-message publish options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub delay_seconds: Option<u32>,
    pub deduplication_id: Option<String>,
}

impl PublishOptions {
    pub fn with_delay_seconds(mut self, seconds: u32) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }

    pub fn with_deduplication_id(mut self, id: impl Into<String>) -> Self {
        self.deduplication_id = Some(id.into());
        self
    }
}

/// Name-based client for one queue service endpoint
pub struct QueueTransport {
    provider: Arc<dyn QueueProvider>,
    registered: RwLock<HashMap<String, QueueUrl>>,
    defaults: QueueDefaults,
}

impl QueueTransport {
    pub fn new(provider: Arc<dyn QueueProvider>, defaults: QueueDefaults) -> Self {
        Self {
            provider,
            registered: RwLock::new(HashMap::new()),
            defaults,
        }
    }

    pub fn provider(&self) -> &Arc<dyn QueueProvider> {
        &self.provider
    }

    pub fn defaults(&self) -> &QueueDefaults {
        &self.defaults
    }

    // ------------------------------------------------------------------------
    // Administrative operations
    // ------------------------------------------------------------------------

    /// Look up an existing queue; `QueueError::QueueNotFound` when absent
    pub async fn resolve_url(&self, name: &str) -> Result<QueueUrl, QueueError> {
        let queue = QueueName::new(name.to_string())?;
        self.provider.get_queue_url(&queue).await
    }

    /// Create a queue; `QueueError::QueueAlreadyExists` when it lost a race
    pub async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueUrl, QueueError> {
        let queue = QueueName::new(name.to_string())?;
        self.provider.create_queue(&queue, attributes).await
    }

    /// Read the queue's ARN
    pub async fn fetch_arn(&self, url: &QueueUrl) -> Result<String, QueueError> {
        let mut attributes = self
            .provider
            .get_queue_attributes(url, &[attribute_names::QUEUE_ARN])
            .await?;

        attributes
            .remove(attribute_names::QUEUE_ARN)
            .ok_or_else(|| {
                SerializationError::MissingElement {
                    element: attribute_names::QUEUE_ARN.to_string(),
                }
                .into()
            })
    }

    /// Attributes that make the transport move a message to `dead_letter_arn`
    /// after `max_receive_count` deliveries (the transport default when `None`)
    pub fn redrive_policy(
        &self,
        dead_letter_arn: &str,
        max_receive_count: Option<u32>,
    ) -> QueueAttributes {
        let max_receive_count = max_receive_count.unwrap_or(self.defaults.max_receive_count);
        let policy = serde_json::json!({
            "deadLetterTargetArn": dead_letter_arn,
            "maxReceiveCount": max_receive_count.to_string(),
        });

        let mut attributes = QueueAttributes::new();
        attributes.insert(
            attribute_names::REDRIVE_POLICY.to_string(),
            policy.to_string(),
        );
        attributes
    }

    // ------------------------------------------------------------------------
    // Registered URL table
    // ------------------------------------------------------------------------

    pub async fn register_url(&self, name: &str, url: QueueUrl) {
        debug!(queue = %name, url = %url, "Registered queue URL");
        self.registered.write().await.insert(name.to_string(), url);
    }

    pub async fn registered_url(&self, name: &str) -> Option<QueueUrl> {
        self.registered.read().await.get(name).cloned()
    }

    async fn require_url(&self, name: &str) -> Result<QueueUrl, QueueError> {
        self.registered_url(name)
            .await
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: name.to_string(),
            })
    }

    // ------------------------------------------------------------------------
    // Data-plane operations
    // ------------------------------------------------------------------------

    /// Serialize `payload` as JSON and send it to the registered queue `name`
    pub async fn send<T>(
        &self,
        name: &str,
        payload: &T,
        options: &PublishOptions,
    ) -> Result<SendReceipt, QueueError>
    where
        T: Serialize + ?Sized + Sync,
    {
        let body = serde_json::to_string(payload).map_err(SerializationError::from)?;
        self.send_raw(name, body, options).await
    }

    /// Send an already encoded body to the registered queue `name`
    pub async fn send_raw(
        &self,
        name: &str,
        body: String,
        options: &PublishOptions,
    ) -> Result<SendReceipt, QueueError> {
        let url = self.require_url(name).await?;
        let message = OutgoingMessage::new(body)
            .with_delay_seconds(options.delay_seconds)
            .with_deduplication_id(options.deduplication_id.clone());

        self.provider.send_message(&url, &message).await
    }

    /// Delete a message from the registered queue `name`
    pub async fn delete(&self, name: &str, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let url = self.require_url(name).await?;
        self.provider.delete_message(&url, receipt).await
    }

    pub async fn receive(
        &self,
        url: &QueueUrl,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.provider.receive_messages(url, options).await
    }

    /// Delete a message by queue URL
    pub async fn acknowledge(
        &self,
        url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        self.provider.delete_message(url, receipt).await
    }
}

impl std::fmt::Debug for QueueTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueTransport")
            .field("provider", &self.provider.provider_type())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}
