//! # Pub/Sub Core
//!
//! Queue registration and consumption for services built on a managed
//! message queue.
//!
//! The crate idempotently provisions queues together with their dead-letter
//! queues, subscribes pools of long-polling consumers to them and runs each
//! delivered message through a handling pipeline with retry, timeout and
//! dead-letter semantics.
//!
//! ## Architecture
//!
//! - [`transport::QueueTransport`] - name-based queue operations and the
//!   table of registered queue URLs
//! - [`queue_registrar::QueueRegistrar`] - resolve-or-create of a queue and
//!   its `-dl` counterpart, wiring the redrive policy
//! - [`consumer::Consumer`] - one long-polling task per consumer
//! - [`consumer_registrar::ConsumerRegistrar`] - consumer pools and the
//!   per-message pipeline
//! - [`pubsub::PubSub`] - the facade application code uses
//! - [`dedup`] - claim-based duplicate suppression for handlers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use pubsub_core::{ConsumerContract, MessageError, PubSub, PubSubSettings, PublishOptions, QueueDefinition};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct OrderPlaced {
//!     id: String,
//! }
//!
//! struct OrderConsumer;
//!
//! #[async_trait]
//! impl ConsumerContract<OrderPlaced> for OrderConsumer {
//!     async fn on_message(&self, message: OrderPlaced) -> Result<(), MessageError> {
//!         println!("order {}", message.id);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pubsub = PubSub::from_settings(PubSubSettings::default()).await?;
//! let mut orders = QueueDefinition::<OrderPlaced>::new("orders", OrderConsumer);
//! pubsub.register_queue(&mut orders).await?;
//!
//! let order = OrderPlaced { id: "42".to_string() };
//! pubsub.publish(&orders, &order, PublishOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod consumer_registrar;
pub mod contract;
pub mod dedup;
pub mod error;
pub mod pubsub;
pub mod queue;
pub mod queue_registrar;
pub mod settings;
pub mod transport;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at crate root for convenience
pub use consumer::{Consumer, EnvelopeHandler};
pub use consumer_registrar::{ConsumerRegistrar, QueuePipeline};
pub use contract::ConsumerContract;
pub use dedup::{dedupe_and_process, process_once, ClaimStore, InMemoryClaimStore};
pub use error::{ConsumerError, MessageError, ProcessingFailure, ServiceError, ServiceErrorCode};
pub use pubsub::{PubSub, MAX_PUBLISH_DELAY_SECONDS};
pub use queue::{
    dead_letter_name, ConsumerOptions, ConsumerSettings, QueueDefinition, QueueOptions,
    QueueRegistration,
};
pub use queue_registrar::QueueRegistrar;
pub use settings::{ConsumerDefaults, Environment, PubSubSettings, QueueDefaults};
pub use transport::{PublishOptions, QueueTransport};
