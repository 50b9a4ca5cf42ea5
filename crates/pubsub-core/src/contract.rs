//! The handler contract application code implements for a queue.

use crate::error::{ConsumerError, MessageError};
use crate::queue::ConsumerOptions;
use async_trait::async_trait;

/// Message handler bound to one queue definition
///
/// Only [`on_message`](ConsumerContract::on_message) is required. The
/// observers (`on_error`, `on_processing_error`, `on_timeout_error`) are for
/// side-effecting diagnostics; their return value cannot influence the
/// message's fate.
///
/// # Failure classification
///
/// The variant of the returned [`MessageError`] selects the recovery action:
///
/// - `Retry` - logged as a warning, the message becomes visible again after
///   its visibility timeout
/// - `Unrecoverable` - the message is moved to the dead-letter queue
/// - `Unexpected` - logged and passed to `on_processing_error`, the message
///   is left for redelivery
#[async_trait]
pub trait ConsumerContract<M: Send + 'static>: Send + Sync {
    /// Process a message delivered for the first time
    async fn on_message(&self, message: M) -> Result<(), MessageError>;

    /// Process a message that was delivered before
    ///
    /// `receive_count` is the transport's approximate delivery count and is
    /// always greater than one. Defaults to [`on_message`](Self::on_message).
    async fn on_retry(&self, message: M, _receive_count: u32) -> Result<(), MessageError> {
        self.on_message(message).await
    }

    /// Called when polling the queue failed
    fn on_error(&self, _error: &ConsumerError) {}

    /// Called when the handler failed in an unexpected way
    fn on_processing_error(&self, _error: &MessageError) {}

    /// Called when the handler exceeded its time budget
    fn on_timeout_error(&self, _error: &ConsumerError) {}

    /// Polling options for this queue's consumers
    fn options(&self) -> ConsumerOptions {
        ConsumerOptions::default()
    }
}
