//! # Pub/Sub Runtime
//!
//! Queue transport bindings for the pub/sub subsystem, with an AWS SQS
//! implementation speaking the HTTP query API and an in-memory emulation for
//! tests and local development.
//!
//! This library provides:
//! - Queue lookup and creation by name (with creation attributes)
//! - Single-message send with delay and deduplication id
//! - Long-poll receive with visibility timeout and receive counts
//! - Message deletion by receipt handle
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Identifiers, outgoing and received messages
//! - [`provider`] - Provider types and configuration
//! - [`client`] - The provider trait and factory
//! - [`providers`] - AWS SQS and in-memory implementations

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueProvider, QueueProviderFactory};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{
    attribute_names, MessageId, OutgoingMessage, QueueAttributes, QueueName, QueueUrl,
    ReceiptHandle, ReceiveOptions, ReceivedMessage, SendReceipt, Timestamp,
};
pub use provider::{AwsSqsConfig, InMemoryConfig, ProviderConfig, ProviderType};
pub use providers::{AwsSqsProvider, InMemoryProvider};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
