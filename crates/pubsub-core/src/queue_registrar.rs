//! Idempotent provisioning of queues and their dead-letter queues.
//!
//! Registration is safe to repeat and safe to race: an existing queue is
//! resolved rather than created, and a create that loses a race against
//! another process falls back to resolving the winner's queue.

use crate::error::ServiceError;
use crate::queue::{dead_letter_name, QueueOptions};
use crate::transport::QueueTransport;
use futures::future::{BoxFuture, FutureExt};
use pubsub_runtime::{attribute_names, QueueAttributes, QueueError, QueueUrl};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
#[path = "queue_registrar_tests.rs"]
mod tests;

/// A queue to resolve-or-create, with an optional queue it depends on
#[derive(Debug)]
struct QueuePlan {
    name: String,
    attributes: QueueAttributes,
    max_receive_count: u32,
    /// Must exist before this queue is created; its ARN becomes the redrive target
    dead_letter: Option<Box<QueuePlan>>,
}

/// Ensures queues exist and records their URLs with the transport
pub struct QueueRegistrar {
    transport: Arc<QueueTransport>,
}

impl QueueRegistrar {
    pub fn new(transport: Arc<QueueTransport>) -> Self {
        Self { transport }
    }

    /// Resolve or create `name` and its dead-letter queue, then register the URLs
    ///
    /// Transport failures other than "not found" and "already exists" abort
    /// the registration with an internal error. Failing to register the
    /// dead-letter URL is only logged.
    #[instrument(skip_all, fields(queue = %name))]
    pub async fn register(
        &self,
        name: &str,
        options: &QueueOptions,
    ) -> Result<QueueUrl, ServiceError> {
        let plan = self.plan(name, options);

        let url = self.ensure(&plan).await.map_err(|e| {
            error!(queue = %name, error = %e, "Failed to register queue");
            ServiceError::internal(format!("failed to register queue '{}'", name)).with_source(e)
        })?;
        self.transport.register_url(name, url.clone()).await;

        let dead_letter = dead_letter_name(name);
        match self.transport.resolve_url(&dead_letter).await {
            Ok(dead_letter_url) => {
                self.transport
                    .register_url(&dead_letter, dead_letter_url)
                    .await
            }
            Err(e) => warn!(
                queue = %dead_letter,
                error = %e,
                "Could not register dead-letter queue URL"
            ),
        }

        info!(queue = %name, url = %url, "Queue registered");
        Ok(url)
    }

    fn plan(&self, name: &str, options: &QueueOptions) -> QueuePlan {
        let mut attributes = QueueAttributes::new();
        if let Some(delay) = options.delay_seconds {
            attributes.insert(
                attribute_names::DELAY_SECONDS.to_string(),
                delay.to_string(),
            );
        }

        QueuePlan {
            name: name.to_string(),
            attributes,
            max_receive_count: options.max_receive_count_or(self.transport.defaults()),
            dead_letter: Some(Box::new(QueuePlan {
                name: dead_letter_name(name),
                attributes: QueueAttributes::new(),
                max_receive_count: 0,
                dead_letter: None,
            })),
        }
    }

    /// Resolve the queue, creating it (after its dead-letter queue) when missing
    fn ensure<'a>(&'a self, plan: &'a QueuePlan) -> BoxFuture<'a, Result<QueueUrl, QueueError>> {
        async move {
            match self.transport.resolve_url(&plan.name).await {
                Ok(url) => {
                    debug!(queue = %plan.name, "Queue already exists");
                    return Ok(url);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }

            let mut attributes = plan.attributes.clone();
            if let Some(dead_letter) = &plan.dead_letter {
                let dead_letter_url = self.ensure(dead_letter).await?;
                let dead_letter_arn = self.transport.fetch_arn(&dead_letter_url).await?;
                attributes.extend(
                    self.transport
                        .redrive_policy(&dead_letter_arn, Some(plan.max_receive_count)),
                );
            }

            match self.transport.create_queue(&plan.name, &attributes).await {
                Ok(url) => {
                    info!(queue = %plan.name, "Queue created");
                    Ok(url)
                }
                Err(e) if e.is_already_exists() => {
                    debug!(queue = %plan.name, "Queue created concurrently, resolving");
                    self.transport.resolve_url(&plan.name).await
                }
                Err(e) => Err(e),
            }
        }
        .boxed()
    }
}
