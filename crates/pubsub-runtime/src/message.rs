//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Attribute bundle attached to a queue at creation time (e.g. `RedrivePolicy`)
pub type QueueAttributes = HashMap<String, String>;

/// Well-known queue and message attribute names used by the queue service
pub mod attribute_names {
    /// Approximate number of times a message has been received
    pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";
    /// Caller-supplied deduplication id
    pub const MESSAGE_DEDUPLICATION_ID: &str = "MessageDeduplicationId";
    /// Amazon resource name of a queue
    pub const QUEUE_ARN: &str = "QueueArn";
    /// Dead-letter redrive configuration of a queue
    pub const REDRIVE_POLICY: &str = "RedrivePolicy";
    /// Fixed delivery delay of a queue
    pub const DELAY_SECONDS: &str = "DelaySeconds";
    /// Default visibility timeout of a queue
    pub const VISIBILITY_TIMEOUT: &str = "VisibilityTimeout";
}

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name following the queue service naming rules
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Maximum length of a queue name, including a `.fifo` suffix
    pub const MAX_LENGTH: usize = 80;

    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > Self::MAX_LENGTH {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: format!("must be 1-{} characters", Self::MAX_LENGTH),
            });
        }

        let base = name.strip_suffix(".fifo").unwrap_or(&name);
        if base.is_empty()
            || !base
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Transport-assigned URL of a queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueUrl(String);

impl QueueUrl {
    /// Wrap a URL returned by the queue service
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Get queue URL as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for messages within the queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque token used to delete (acknowledge) a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get handle string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be sent through the queue system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// UTF-8 body, already encoded by the caller
    pub body: String,
    /// Per-message delivery delay in seconds
    pub delay_seconds: Option<u32>,
    /// Caller-supplied deduplication id
    pub deduplication_id: Option<String>,
}

impl OutgoingMessage {
    /// Create new message with body
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            delay_seconds: None,
            deduplication_id: None,
        }
    }

    /// Delay the delivery of this message
    pub fn with_delay_seconds(mut self, delay_seconds: Option<u32>) -> Self {
        self.delay_seconds = delay_seconds;
        self
    }

    /// Attach a deduplication id
    pub fn with_deduplication_id(mut self, deduplication_id: Option<String>) -> Self {
        self.deduplication_id = deduplication_id;
        self
    }
}

/// A message received from the queue with its transport metadata (the envelope)
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: String,
    pub receipt_handle: Option<ReceiptHandle>,
    /// System attributes such as `ApproximateReceiveCount`
    pub attributes: HashMap<String, String>,
    /// Application-level message attributes (string values only)
    pub message_attributes: HashMap<String, String>,
    pub received_at: Timestamp,
}

impl ReceivedMessage {
    /// Approximate number of times this message was delivered, `1` when unknown
    pub fn receive_count(&self) -> u32 {
        self.attributes
            .get(attribute_names::APPROXIMATE_RECEIVE_COUNT)
            .and_then(|count| count.parse().ok())
            .unwrap_or(1)
    }

    /// Deduplication id supplied by the publisher, if the transport reported one
    pub fn deduplication_id(&self) -> Option<&str> {
        self.attributes
            .get(attribute_names::MESSAGE_DEDUPLICATION_ID)
            .map(String::as_str)
    }
}

/// Confirmation returned by the queue service for an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: MessageId,
    pub md5_of_body: Option<String>,
}

/// Options for a single long-poll receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Maximum number of messages to receive in one call (1-10)
    pub max_messages: u32,
    /// Long-poll wait time (0-20 seconds)
    pub wait_time: Duration,
    /// Visibility timeout applied to the received messages
    pub visibility_timeout: Option<Duration>,
    /// System attributes to return with each message
    pub attribute_names: Vec<String>,
    /// Message attributes to return with each message
    pub message_attribute_names: Vec<String>,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_messages: 1,
            wait_time: Duration::from_secs(20),
            visibility_timeout: None,
            attribute_names: vec![
                attribute_names::APPROXIMATE_RECEIVE_COUNT.to_string(),
                attribute_names::MESSAGE_DEDUPLICATION_ID.to_string(),
            ],
            message_attribute_names: Vec::new(),
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
