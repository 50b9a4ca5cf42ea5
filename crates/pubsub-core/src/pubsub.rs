//! Publish/registration facade, the surface application code uses.

use crate::consumer_registrar::ConsumerRegistrar;
use crate::error::ServiceError;
use crate::queue::{QueueDefinition, QueueRegistration};
use crate::queue_registrar::QueueRegistrar;
use crate::settings::PubSubSettings;
use crate::transport::{PublishOptions, QueueTransport};
use futures::future::join_all;
use pubsub_runtime::{QueueProviderFactory, QueueUrl, SendReceipt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

#[cfg(test)]
#[path = "pubsub_tests.rs"]
mod tests;

/// Longest delivery delay the queue service accepts
///
/// Not enforced here: larger delays are passed through and rejected by the
/// transport.
pub const MAX_PUBLISH_DELAY_SECONDS: u32 = 900;

/// Entry point for publishing messages and registering queues
pub struct PubSub {
    transport: Arc<QueueTransport>,
    settings: Arc<PubSubSettings>,
    queue_registrar: QueueRegistrar,
    consumer_registrar: ConsumerRegistrar,
}

impl PubSub {
    pub fn new(transport: Arc<QueueTransport>, settings: PubSubSettings) -> Self {
        let settings = Arc::new(settings);
        Self {
            queue_registrar: QueueRegistrar::new(Arc::clone(&transport)),
            consumer_registrar: ConsumerRegistrar::new(
                Arc::clone(&transport),
                Arc::clone(&settings),
            ),
            transport,
            settings,
        }
    }

    /// Build the provider named in the settings and a facade over it
    pub async fn from_settings(settings: PubSubSettings) -> Result<Self, ServiceError> {
        let provider = QueueProviderFactory::create_provider(settings.provider.clone())
            .await
            .map_err(|e| {
                ServiceError::internal("failed to create queue provider")
                    .with_source(e)
                    .recoverable(false)
            })?;
        info!(provider = %provider.provider_type(), "Queue provider created");

        let transport = Arc::new(QueueTransport::new(provider, settings.defaults.clone()));
        Ok(Self::new(transport, settings))
    }

    pub fn transport(&self) -> &Arc<QueueTransport> {
        &self.transport
    }

    pub fn settings(&self) -> &PubSubSettings {
        &self.settings
    }

    pub fn consumer_registrar(&self) -> &ConsumerRegistrar {
        &self.consumer_registrar
    }

    /// Serialize `message` and send it to the queue's registered URL
    ///
    /// Every failure, including a queue that was never registered, is
    /// reported as an internal error.
    pub async fn publish<M>(
        &self,
        queue: &QueueDefinition<M>,
        message: &M,
        options: PublishOptions,
    ) -> Result<SendReceipt, ServiceError>
    where
        M: Serialize + Send + Sync + 'static,
    {
        self.transport
            .send(queue.name(), message, &options)
            .await
            .map_err(|e| {
                error!(queue = %queue.name(), error = %e, "Failed to publish message");
                let recoverable = e.is_transient();
                ServiceError::internal(format!("failed to publish to queue '{}'", queue.name()))
                    .with_source(e)
                    .recoverable(recoverable)
            })
    }

    /// Provision the queue and its dead-letter queue, then subscribe its consumers
    ///
    /// The environment suffix is applied to the definition's name first.
    /// A provisioning failure returns before any consumer is created.
    pub async fn register_queue(
        &self,
        queue: &mut dyn QueueRegistration,
    ) -> Result<QueueUrl, ServiceError> {
        queue.apply_environment_suffix(self.settings.effective_suffix());

        let url = self
            .queue_registrar
            .register(queue.name(), queue.options())
            .await?;

        self.consumer_registrar.subscribe_consumers(&*queue, &url)
    }

    /// Register several queues concurrently; each result is independent
    pub async fn register_queues(
        &self,
        queues: Vec<&mut dyn QueueRegistration>,
    ) -> Vec<Result<QueueUrl, ServiceError>> {
        join_all(queues.into_iter().map(|queue| self.register_queue(queue))).await
    }

    /// Stop all consumers, waiting for in-flight messages to finish
    pub async fn shutdown(&self) {
        info!("Shutting down pub/sub consumers");
        self.consumer_registrar.stop_all().await;
    }
}
