//! Queue definitions and their options.
//!
//! A [`QueueDefinition`] is the declarative description of one logical
//! queue: its name, the [`ConsumerContract`] that handles its messages and
//! the [`QueueOptions`] used when the queue is provisioned. The type-erased
//! [`QueueRegistration`] view lets the facade register definitions of
//! different message types side by side.

use crate::consumer::EnvelopeHandler;
use crate::consumer_registrar::QueuePipeline;
use crate::contract::ConsumerContract;
use crate::error::ConsumerError;
use crate::settings::{ConsumerDefaults, Environment, QueueDefaults};
use crate::transport::QueueTransport;
use pubsub_runtime::{attribute_names, ReceiveOptions};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

/// Suffix that turns a queue name into its dead-letter queue name
pub const DEAD_LETTER_SUFFIX: &str = "-dl";

/// Name of the dead-letter queue belonging to `queue_name`
pub fn dead_letter_name(queue_name: &str) -> String {
    format!("{}{}", queue_name, DEAD_LETTER_SUFFIX)
}

// ============================================================================
// Queue Options
// ============================================================================

/// Provisioning options for a queue; unset values use [`QueueDefaults`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Consumers started for this queue in each process
    pub consumer_count: Option<u32>,
    /// Deliveries before the transport redrives a message to the dead-letter queue
    pub max_receive_count: Option<u32>,
    /// Fixed delivery delay applied to every message published to the queue
    pub delay_seconds: Option<u32>,
}

impl QueueOptions {
    pub fn with_consumer_count(mut self, count: u32) -> Self {
        self.consumer_count = Some(count);
        self
    }

    pub fn with_max_receive_count(mut self, count: u32) -> Self {
        self.max_receive_count = Some(count);
        self
    }

    pub fn with_delay_seconds(mut self, seconds: u32) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }

    pub fn consumer_count_or(&self, defaults: &QueueDefaults) -> u32 {
        self.consumer_count.unwrap_or(defaults.consumer_count)
    }

    pub fn max_receive_count_or(&self, defaults: &QueueDefaults) -> u32 {
        self.max_receive_count.unwrap_or(defaults.max_receive_count)
    }
}

// ============================================================================
// Consumer Options
// ============================================================================

/// Per-contract polling overrides; unset values use [`ConsumerDefaults`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerOptions {
    pub attribute_names: Option<Vec<String>>,
    pub message_attribute_names: Option<Vec<String>>,
    pub visibility_timeout: Option<Duration>,
    pub handle_timeout: Option<Duration>,
    pub wait_time: Option<Duration>,
    pub authentication_error_timeout: Option<Duration>,
    pub polling_wait: Option<Duration>,
    /// Messages fetched per poll (1-10)
    pub batch_size: Option<u32>,
}

impl ConsumerOptions {
    /// Fill unset values from the defaults
    ///
    /// In the test environment the long-poll wait time is always the short
    /// test wait time so that stopping a consumer is prompt.
    pub fn resolve(&self, defaults: &ConsumerDefaults, environment: Environment) -> ConsumerSettings {
        let wait_time = if environment.is_test() {
            defaults.test_wait_time()
        } else {
            self.wait_time.unwrap_or_else(|| defaults.wait_time())
        };

        ConsumerSettings {
            attribute_names: self.attribute_names.clone().unwrap_or_else(|| {
                vec![
                    attribute_names::APPROXIMATE_RECEIVE_COUNT.to_string(),
                    attribute_names::MESSAGE_DEDUPLICATION_ID.to_string(),
                ]
            }),
            message_attribute_names: self.message_attribute_names.clone().unwrap_or_default(),
            visibility_timeout: self
                .visibility_timeout
                .unwrap_or_else(|| defaults.visibility_timeout()),
            handle_timeout: self
                .handle_timeout
                .unwrap_or_else(|| defaults.handle_timeout()),
            wait_time,
            authentication_error_timeout: self
                .authentication_error_timeout
                .unwrap_or_else(|| defaults.authentication_error_timeout()),
            polling_wait: self
                .polling_wait
                .unwrap_or_else(|| defaults.polling_wait()),
            batch_size: self.batch_size.unwrap_or(1),
        }
    }
}

/// Fully resolved consumer polling settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub attribute_names: Vec<String>,
    pub message_attribute_names: Vec<String>,
    pub visibility_timeout: Duration,
    pub handle_timeout: Duration,
    pub wait_time: Duration,
    pub authentication_error_timeout: Duration,
    pub polling_wait: Duration,
    pub batch_size: u32,
}

impl ConsumerSettings {
    pub const MAX_WAIT_TIME: Duration = Duration::from_secs(20);
    pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);
    pub const MAX_BATCH_SIZE: u32 = 10;

    /// Reject settings the queue service would refuse or that would stall the consumer
    pub fn validate(&self) -> Result<(), ConsumerError> {
        if self.handle_timeout.is_zero() {
            return Err(invalid("handle timeout must be greater than zero"));
        }
        if self.wait_time > Self::MAX_WAIT_TIME {
            return Err(invalid(format!(
                "wait time {:?} exceeds the maximum of {:?}",
                self.wait_time,
                Self::MAX_WAIT_TIME
            )));
        }
        if self.visibility_timeout > Self::MAX_VISIBILITY_TIMEOUT {
            return Err(invalid(format!(
                "visibility timeout {:?} exceeds the maximum of {:?}",
                self.visibility_timeout,
                Self::MAX_VISIBILITY_TIMEOUT
            )));
        }
        if !(1..=Self::MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(invalid(format!(
                "batch size {} must be between 1 and {}",
                self.batch_size,
                Self::MAX_BATCH_SIZE
            )));
        }
        Ok(())
    }

    /// Options for one receive call
    pub fn receive_options(&self) -> ReceiveOptions {
        ReceiveOptions {
            max_messages: self.batch_size,
            wait_time: self.wait_time,
            visibility_timeout: Some(self.visibility_timeout),
            attribute_names: self.attribute_names.clone(),
            message_attribute_names: self.message_attribute_names.clone(),
        }
    }
}

fn invalid(message: impl Into<String>) -> ConsumerError {
    ConsumerError::InvalidOptions {
        message: message.into(),
    }
}

// ============================================================================
// Queue Definition
// ============================================================================

/// Declarative description of one queue and the contract handling its messages
pub struct QueueDefinition<M: Send + 'static> {
    name: String,
    suffixed: bool,
    contract: Arc<dyn ConsumerContract<M>>,
    options: QueueOptions,
}

impl<M: Send + 'static> QueueDefinition<M> {
    pub fn new(name: impl Into<String>, contract: impl ConsumerContract<M> + 'static) -> Self {
        Self::from_arc(name, Arc::new(contract))
    }

    /// Build from a contract that is shared with other code
    pub fn from_arc(name: impl Into<String>, contract: Arc<dyn ConsumerContract<M>>) -> Self {
        Self {
            name: name.into(),
            suffixed: false,
            contract,
            options: QueueOptions::default(),
        }
    }

    pub fn with_options(mut self, options: QueueOptions) -> Self {
        self.options = options;
        self
    }

    /// Current name, including the environment suffix once applied
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dead_letter_name(&self) -> String {
        dead_letter_name(&self.name)
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn contract(&self) -> &Arc<dyn ConsumerContract<M>> {
        &self.contract
    }

    /// Append `-<suffix>` to the name
    ///
    /// Only the first call has any effect; blank suffixes are ignored.
    pub fn apply_environment_suffix(&mut self, suffix: Option<&str>) {
        if self.suffixed {
            return;
        }
        self.suffixed = true;

        if let Some(suffix) = suffix.map(str::trim).filter(|s| !s.is_empty()) {
            self.name = format!("{}-{}", self.name, suffix);
        }
    }
}

impl<M: Send + 'static> std::fmt::Debug for QueueDefinition<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueDefinition")
            .field("name", &self.name)
            .field("suffixed", &self.suffixed)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a [`QueueDefinition`] used during registration
pub trait QueueRegistration: Send + Sync {
    fn name(&self) -> &str;

    fn options(&self) -> &QueueOptions;

    fn apply_environment_suffix(&mut self, suffix: Option<&str>);

    fn consumer_options(&self) -> ConsumerOptions;

    /// Build the per-message pipeline consumers of this queue run
    fn pipeline(&self, transport: Arc<QueueTransport>) -> Arc<dyn EnvelopeHandler>;
}

impl<M> QueueRegistration for QueueDefinition<M>
where
    M: DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        QueueDefinition::name(self)
    }

    fn options(&self) -> &QueueOptions {
        QueueDefinition::options(self)
    }

    fn apply_environment_suffix(&mut self, suffix: Option<&str>) {
        QueueDefinition::apply_environment_suffix(self, suffix)
    }

    fn consumer_options(&self) -> ConsumerOptions {
        self.contract.options()
    }

    fn pipeline(&self, transport: Arc<QueueTransport>) -> Arc<dyn EnvelopeHandler> {
        Arc::new(QueuePipeline::new(
            self.name.clone(),
            Arc::clone(&self.contract),
            transport,
        ))
    }
}
