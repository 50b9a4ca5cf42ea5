//! Error types for the pub/sub core.
//!
//! Three families of errors cross this crate's seams:
//!
//! - [`ServiceError`] - coded application errors carrying a recoverability flag,
//!   returned from registration and publish operations
//! - [`MessageError`] - the retry/unrecoverable pair returned by consumer
//!   contracts, which drives the consumer's recovery action
//! - [`ConsumerError`] - consumer construction and polling failures

use pubsub_runtime::QueueError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

// ============================================================================
// Service Errors
// ============================================================================

/// Machine-readable classification of a [`ServiceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceErrorCode {
    InternalServerError,
    ValidationFailed,
    EntityAlreadyExists,
    QueueNotFound,
}

impl ServiceErrorCode {
    /// Stable string form of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::EntityAlreadyExists => "ENTITY_ALREADY_EXISTS",
            Self::QueueNotFound => "QUEUE_NOT_FOUND",
        }
    }

    /// Message used when the error carries no message of its own
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::InternalServerError => "An internal server error occurred, please try again later",
            Self::ValidationFailed => "Request failed validation - see details",
            Self::EntityAlreadyExists => "An entity with these unique properties already exists",
            Self::QueueNotFound => "Queue not found",
        }
    }

    /// HTTP status an HTTP-facing caller should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InternalServerError => 500,
            Self::ValidationFailed | Self::EntityAlreadyExists => 400,
            Self::QueueNotFound => 404,
        }
    }
}

impl std::fmt::Display for ServiceErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coded application error with an optional cause and a recoverability flag
///
/// The `recoverable` flag (default `true`) tells the messaging pipeline
/// whether a failed message may succeed when delivered again. It decides
/// both the dedup claim rollback in [`crate::dedup`] and the mapping into
/// [`MessageError::Retry`] or [`MessageError::Unrecoverable`].
#[derive(Debug, Error)]
#[error("{code}: {}", self.message())]
pub struct ServiceError {
    pub code: ServiceErrorCode,
    pub detail: Option<String>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    pub recoverable: bool,
}

impl ServiceError {
    /// Create a recoverable error with the code's default message
    pub fn new(code: ServiceErrorCode) -> Self {
        Self {
            code,
            detail: None,
            source: None,
            recoverable: true,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.detail = Some(message.into());
        self
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Internal error with a message
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorCode::InternalServerError).with_message(message)
    }

    /// Internal error that must not be retried
    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::internal(message).recoverable(false)
    }

    /// Internal error that may succeed on redelivery
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::internal(message)
    }

    /// Queue missing from the registered URL table or the transport
    pub fn not_found(queue_name: &str) -> Self {
        Self::new(ServiceErrorCode::QueueNotFound).with_message(queue_name)
    }

    /// The explicit message, or the code's default message
    pub fn message(&self) -> &str {
        self.detail
            .as_deref()
            .unwrap_or_else(|| self.code.default_message())
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

// ============================================================================
// Message Processing Errors
// ============================================================================

/// Outcome of a failed consumer contract invocation
///
/// The consumer pattern-matches on the variant to pick its recovery action:
/// `Retry` leaves the message for redelivery, `Unrecoverable` moves it to
/// the dead-letter queue, `Unexpected` is reported to the contract's
/// processing-error observer.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("{0}")]
    Retry(String),

    #[error("{0}")]
    Unrecoverable(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl MessageError {
    pub fn retry(detail: impl Into<String>) -> Self {
        Self::Retry(detail.into())
    }

    pub fn unrecoverable(detail: impl Into<String>) -> Self {
        Self::Unrecoverable(detail.into())
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }
}

impl From<ServiceError> for MessageError {
    fn from(error: ServiceError) -> Self {
        let mut text = error.code.default_message().to_string();
        if let Some(detail) = error.detail.as_deref().filter(|d| !d.is_empty()) {
            text.push_str(" :: ");
            text.push_str(&serde_json::Value::String(detail.to_string()).to_string());
        }

        if error.recoverable {
            Self::Retry(text)
        } else {
            Self::Unrecoverable(text)
        }
    }
}

/// Why one delivered envelope did not complete
#[derive(Debug, Error)]
pub enum ProcessingFailure {
    /// Empty or undecodable body; the contract was never invoked
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error(transparent)]
    Handler(#[from] MessageError),
}

// ============================================================================
// Consumer Errors
// ============================================================================

/// Consumer construction and polling failures
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Invalid consumer options: {message}")]
    InvalidOptions { message: String },

    #[error("Queue transport error: {0}")]
    Transport(#[from] QueueError),

    #[error("Message handler timed out after {timeout:?} (message {message_id})")]
    HandlerTimeout {
        timeout: Duration,
        message_id: String,
    },
}

impl ConsumerError {
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(QueueError::AuthenticationFailed { .. })
        )
    }
}
