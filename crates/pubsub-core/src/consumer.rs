//! Long-polling consumer bound to one queue URL.
//!
//! A [`Consumer`] owns one background task that repeatedly long-polls its
//! queue and hands each delivered envelope to an [`EnvelopeHandler`], one at
//! a time. It is the transport-side half of message handling:
//!
//! - the handler invocation is bounded by the handle timeout
//! - a successful invocation is acknowledged by deleting the message
//! - failures and timeouts leave the message for visibility-timeout
//!   redelivery and are reported back to the handler
//!
//! Stopping is cooperative: the stop signal interrupts a pending poll or
//! back-off, never an in-flight handler invocation.

use crate::error::{ConsumerError, ProcessingFailure};
use crate::queue::ConsumerSettings;
use crate::transport::QueueTransport;
use async_trait::async_trait;
use pubsub_runtime::{QueueUrl, ReceivedMessage};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// Shortest pause after a failed poll
const MIN_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Message-level callbacks a consumer drives
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    /// Process one envelope; `Ok` acknowledges it
    async fn handle(&self, envelope: &ReceivedMessage) -> Result<(), ProcessingFailure>;

    /// The envelope was not processed successfully
    async fn on_processing_error(&self, envelope: &ReceivedMessage, failure: ProcessingFailure);

    /// Processing the envelope exceeded the handle timeout
    async fn on_timeout_error(&self, envelope: &ReceivedMessage, error: ConsumerError);

    /// Polling or acknowledging failed
    async fn on_error(&self, error: ConsumerError);
}

struct Worker {
    queue_name: String,
    queue_url: QueueUrl,
    settings: ConsumerSettings,
    transport: Arc<QueueTransport>,
    handler: Arc<dyn EnvelopeHandler>,
}

/// A poller for one queue
pub struct Consumer {
    worker: Arc<Worker>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Consumer {
    /// Create a stopped consumer; fails when the settings are invalid
    pub fn new(
        queue_name: impl Into<String>,
        queue_url: QueueUrl,
        settings: ConsumerSettings,
        transport: Arc<QueueTransport>,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Result<Self, ConsumerError> {
        settings.validate()?;

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            worker: Arc::new(Worker {
                queue_name: queue_name.into(),
                queue_url,
                settings,
                transport,
                handler,
            }),
            shutdown,
            task: Mutex::new(None),
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.worker.queue_name
    }

    pub fn settings(&self) -> &ConsumerSettings {
        &self.worker.settings
    }

    /// Spawn the polling task; returns `false` when it is already running
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = self.lock_task();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        self.shutdown.send_replace(false);
        let shutdown = self.shutdown.subscribe();
        let worker = Arc::clone(&self.worker);
        *task = Some(tokio::spawn(async move { worker.run(shutdown).await }));
        true
    }

    pub fn is_running(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the polling task to stop and wait for it to finish
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let handle = self.lock_task().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(queue = %self.worker.queue_name, error = %e, "Consumer task ended abnormally");
            }
        }
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl Worker {
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(queue = %self.queue_name, "Consumer started");
        let options = self.settings.receive_options();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let poll = tokio::select! {
                result = self.transport.receive(&self.queue_url, &options) => result,
                _ = shutdown.changed() => break,
            };

            match poll {
                Ok(messages) => {
                    debug!(queue = %self.queue_name, count = messages.len(), "Poll completed");
                    for message in &messages {
                        self.process(message).await;
                    }
                }
                Err(e) => {
                    let retry_hint = e.retry_after();
                    let error = ConsumerError::from(e);
                    let backoff = if error.is_authentication_failure() {
                        self.settings.authentication_error_timeout
                    } else {
                        let floor = retry_hint.unwrap_or(MIN_ERROR_BACKOFF);
                        self.settings.polling_wait.max(floor)
                    };
                    self.handler.on_error(error).await;

                    if pause(backoff, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            }

            if !self.settings.polling_wait.is_zero()
                && pause(self.settings.polling_wait, &mut shutdown).await
            {
                break;
            }
        }

        info!(queue = %self.queue_name, "Consumer stopped");
    }

    async fn process(&self, message: &ReceivedMessage) {
        let timeout = self.settings.handle_timeout;

        match tokio::time::timeout(timeout, self.handler.handle(message)).await {
            Ok(Ok(())) => self.acknowledge(message).await,
            Ok(Err(failure)) => self.handler.on_processing_error(message, failure).await,
            Err(_) => {
                let error = ConsumerError::HandlerTimeout {
                    timeout,
                    message_id: message.message_id.to_string(),
                };
                self.handler.on_timeout_error(message, error).await
            }
        }
    }

    async fn acknowledge(&self, message: &ReceivedMessage) {
        let Some(receipt) = &message.receipt_handle else {
            error!(
                queue = %self.queue_name,
                message_id = %message.message_id,
                "Received message has no receipt handle, cannot acknowledge"
            );
            return;
        };

        if let Err(e) = self.transport.acknowledge(&self.queue_url, receipt).await {
            self.handler.on_error(ConsumerError::from(e)).await;
        }
    }
}

/// Sleep for `duration`; returns `true` when shutdown was signalled meanwhile
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = shutdown.changed() => return true,
    }
    *shutdown.borrow()
}
