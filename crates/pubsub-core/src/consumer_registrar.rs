//! Consumer pools and the per-message handling pipeline.
//!
//! [`ConsumerRegistrar`] starts the configured number of [`Consumer`]s for a
//! registered queue and keeps them so they can be stopped on shutdown (or
//! started on demand in the test environment).
//!
//! [`QueuePipeline`] is what each consumer runs for a delivered envelope:
//!
//! ```text
//! Received -> Decoded -> Dispatched -> Acknowledged
//!                                   -> RetryPending   (Retry, timeout)
//!                                   -> DeadLettered   (Unrecoverable)
//!                                   -> ErrorObserved  (Unexpected, transport error)
//! ```
//!
//! Envelopes that cannot be decoded never reach the contract; they are left
//! for the queue's redrive policy.

use crate::consumer::{Consumer, EnvelopeHandler};
use crate::contract::ConsumerContract;
use crate::error::{ConsumerError, MessageError, ProcessingFailure, ServiceError};
use crate::queue::{dead_letter_name, QueueRegistration};
use crate::settings::PubSubSettings;
use crate::transport::{PublishOptions, QueueTransport};
use async_trait::async_trait;
use pubsub_runtime::{QueueUrl, ReceivedMessage};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

#[cfg(test)]
#[path = "consumer_registrar_tests.rs"]
mod tests;

// ============================================================================
// Message Pipeline
// ============================================================================

/// Decodes envelopes for one queue and routes them through its contract
pub struct QueuePipeline<M: Send + 'static> {
    queue_name: String,
    contract: Arc<dyn ConsumerContract<M>>,
    transport: Arc<QueueTransport>,
}

impl<M> QueuePipeline<M>
where
    M: DeserializeOwned + Send + 'static,
{
    pub fn new(
        queue_name: impl Into<String>,
        contract: Arc<dyn ConsumerContract<M>>,
        transport: Arc<QueueTransport>,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            contract,
            transport,
        }
    }

    fn decode(&self, envelope: &ReceivedMessage) -> Result<M, ProcessingFailure> {
        if envelope.body.is_empty() {
            error!(
                queue = %self.queue_name,
                message_id = %envelope.message_id,
                "Received message has invalid format: empty body"
            );
            return Err(ProcessingFailure::Malformed("empty body".to_string()));
        }

        serde_json::from_str(&envelope.body).map_err(|e| {
            error!(
                queue = %self.queue_name,
                message_id = %envelope.message_id,
                error = %e,
                "Failed to parse message body"
            );
            ProcessingFailure::Malformed(e.to_string())
        })
    }

    /// Send the envelope's body to the dead-letter queue, then delete it here
    ///
    /// A failed send leaves the message in place for the redrive policy.
    async fn dead_letter(&self, envelope: &ReceivedMessage) {
        let Some(receipt) = &envelope.receipt_handle else {
            warn!(
                queue = %self.queue_name,
                message_id = %envelope.message_id,
                "Message has no receipt handle, skipping dead-letter hand-off"
            );
            return;
        };

        let dead_letter = dead_letter_name(&self.queue_name);
        if let Err(e) = self
            .transport
            .send_raw(&dead_letter, envelope.body.clone(), &PublishOptions::default())
            .await
        {
            error!(
                queue = %self.queue_name,
                dead_letter_queue = %dead_letter,
                error = %e,
                "Failed to move message to dead-letter queue"
            );
            return;
        }

        if let Err(e) = self.transport.delete(&self.queue_name, receipt).await {
            error!(
                queue = %self.queue_name,
                error = %e,
                "Failed to delete dead-lettered message from source queue"
            );
            return;
        }

        info!(
            queue = %self.queue_name,
            message_id = %envelope.message_id,
            "Message moved to dead-letter queue"
        );
    }
}

#[async_trait]
impl<M> EnvelopeHandler for QueuePipeline<M>
where
    M: DeserializeOwned + Send + 'static,
{
    async fn handle(&self, envelope: &ReceivedMessage) -> Result<(), ProcessingFailure> {
        let message = self.decode(envelope)?;

        let receive_count = envelope.receive_count();
        let outcome = if receive_count > 1 {
            info!(
                queue = %self.queue_name,
                message_id = %envelope.message_id,
                receive_count,
                "Retrying message"
            );
            self.contract.on_retry(message, receive_count).await
        } else {
            self.contract.on_message(message).await
        };

        outcome.map_err(ProcessingFailure::from)
    }

    async fn on_processing_error(&self, envelope: &ReceivedMessage, failure: ProcessingFailure) {
        match failure {
            // Already logged while decoding
            ProcessingFailure::Malformed(_) => {}
            ProcessingFailure::Handler(MessageError::Retry(detail)) => warn!(
                queue = %self.queue_name,
                message_id = %envelope.message_id,
                detail = %detail,
                "Message processing will be retried"
            ),
            ProcessingFailure::Handler(MessageError::Unrecoverable(detail)) => {
                error!(
                    queue = %self.queue_name,
                    message_id = %envelope.message_id,
                    detail = %detail,
                    "Message cannot be processed"
                );
                self.dead_letter(envelope).await;
            }
            ProcessingFailure::Handler(error) => {
                error!(
                    queue = %self.queue_name,
                    message_id = %envelope.message_id,
                    error = ?error,
                    "Unexpected error while processing message"
                );
                self.contract.on_processing_error(&error);
            }
        }
    }

    async fn on_timeout_error(&self, envelope: &ReceivedMessage, error: ConsumerError) {
        error!(
            queue = %self.queue_name,
            message_id = %envelope.message_id,
            error = %error,
            "Message handler timed out"
        );
        self.contract.on_timeout_error(&error);
    }

    async fn on_error(&self, error: ConsumerError) {
        error!(queue = %self.queue_name, error = %error, "Queue consumer error");
        self.contract.on_error(&error);
    }
}

// ============================================================================
// Consumer Registrar
// ============================================================================

/// Creates and tracks the consumers of every registered queue
pub struct ConsumerRegistrar {
    transport: Arc<QueueTransport>,
    settings: Arc<PubSubSettings>,
    consumers: Mutex<Vec<Arc<Consumer>>>,
}

impl ConsumerRegistrar {
    pub fn new(transport: Arc<QueueTransport>, settings: Arc<PubSubSettings>) -> Self {
        Self {
            transport,
            settings,
            consumers: Mutex::new(Vec::new()),
        }
    }

    /// Create the queue's consumer pool and, outside the test environment, start it
    ///
    /// Stops at the first consumer that cannot be created; consumers created
    /// before it stay registered (and running).
    pub fn subscribe_consumers(
        &self,
        queue: &dyn QueueRegistration,
        queue_url: &QueueUrl,
    ) -> Result<QueueUrl, ServiceError> {
        let count = queue.options().consumer_count_or(&self.settings.defaults);
        let start = !self.settings.environment.is_test();

        for index in 0..count {
            let consumer = self.create_consumer(queue, queue_url).map_err(|e| {
                error!(queue = %queue.name(), index, error = %e, "Failed to create consumer");
                ServiceError::internal(format!(
                    "failed to create consumer {} for queue '{}'",
                    index,
                    queue.name()
                ))
                .with_source(e)
            })?;

            if start {
                consumer.start();
            }
            self.lock_consumers().push(consumer);
        }

        info!(queue = %queue.name(), consumers = count, started = start, "Consumers subscribed");
        Ok(queue_url.clone())
    }

    /// Build one stopped consumer for the queue
    pub fn create_consumer(
        &self,
        queue: &dyn QueueRegistration,
        queue_url: &QueueUrl,
    ) -> Result<Arc<Consumer>, ConsumerError> {
        let settings = queue
            .consumer_options()
            .resolve(&self.settings.consumer, self.settings.environment);

        let consumer = Consumer::new(
            queue.name(),
            queue_url.clone(),
            settings,
            Arc::clone(&self.transport),
            queue.pipeline(Arc::clone(&self.transport)),
        )?;
        Ok(Arc::new(consumer))
    }

    /// Start every registered consumer that is not already running
    pub fn start_all(&self) {
        for consumer in self.lock_consumers().iter() {
            consumer.start();
        }
    }

    /// Stop every registered consumer and wait for their tasks to finish
    pub async fn stop_all(&self) {
        let consumers: Vec<Arc<Consumer>> = self.lock_consumers().clone();
        futures::future::join_all(consumers.iter().map(|consumer| consumer.stop())).await;
        info!(consumers = consumers.len(), "All consumers stopped");
    }

    pub fn consumer_count(&self) -> usize {
        self.lock_consumers().len()
    }

    /// Registered consumers of one queue
    pub fn consumers_for(&self, queue_name: &str) -> Vec<Arc<Consumer>> {
        self.lock_consumers()
            .iter()
            .filter(|consumer| consumer.queue_name() == queue_name)
            .cloned()
            .collect()
    }

    fn lock_consumers(&self) -> MutexGuard<'_, Vec<Arc<Consumer>>> {
        self.consumers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
