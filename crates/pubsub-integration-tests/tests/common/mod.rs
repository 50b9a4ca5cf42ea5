//! Common test utilities for pub/sub integration tests
//!
//! This module provides:
//! - A harness wiring a [`PubSub`] facade to an inspectable in-memory provider
//! - A scripted consumer contract that records what it was handed
//! - Polling helpers for asserting on asynchronous consumer effects

#![allow(dead_code)]

use async_trait::async_trait;
use pubsub_core::{
    ConsumerContract, ConsumerOptions, MessageError, PubSub, PubSubSettings, QueueTransport,
};
use pubsub_runtime::{InMemoryConfig, InMemoryProvider};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Harness
// ============================================================================

/// A facade over an in-memory provider the test can inspect directly
pub struct Harness {
    pub provider: InMemoryProvider,
    pub pubsub: PubSub,
}

impl Harness {
    /// Test environment: consumers are created stopped and poll with a short wait
    pub fn new() -> Self {
        Self::with_settings(PubSubSettings::for_tests())
    }

    pub fn with_settings(settings: PubSubSettings) -> Self {
        let provider = InMemoryProvider::new(InMemoryConfig {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        });
        Self::on_provider(provider, settings)
    }

    /// A second facade sharing the queues of an existing provider
    pub fn on_provider(provider: InMemoryProvider, settings: PubSubSettings) -> Self {
        let transport = Arc::new(QueueTransport::new(
            Arc::new(provider.clone()),
            settings.defaults.clone(),
        ));
        let pubsub = PubSub::new(transport, settings);
        Self { provider, pubsub }
    }
}

// ============================================================================
// Test messages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
}

impl Order {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

// ============================================================================
// Scripted contract
// ============================================================================

/// What the contract saw, in delivery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Message(Order),
    Retry(Order, u32),
}

/// Outcome returned for one delivery
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Succeed,
    Retry,
    Unrecoverable,
}

/// Contract replaying scripted outcomes; succeeds once the script runs out
#[derive(Clone, Default)]
pub struct ScriptedContract {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    script: Arc<Mutex<VecDeque<Outcome>>>,
    options: ConsumerOptions,
}

impl ScriptedContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.script.lock().unwrap().extend(outcomes);
        self
    }

    pub fn with_options(mut self, options: ConsumerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    fn next(&self, delivery: Delivery) -> Result<(), MessageError> {
        self.deliveries.lock().unwrap().push(delivery);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Succeed);

        match outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Retry => Err(MessageError::retry("downstream unavailable")),
            Outcome::Unrecoverable => Err(MessageError::unrecoverable("order rejected")),
        }
    }
}

#[async_trait]
impl ConsumerContract<Order> for ScriptedContract {
    async fn on_message(&self, message: Order) -> Result<(), MessageError> {
        self.next(Delivery::Message(message))
    }

    async fn on_retry(&self, message: Order, receive_count: u32) -> Result<(), MessageError> {
        self.next(Delivery::Retry(message, receive_count))
    }

    fn options(&self) -> ConsumerOptions {
        self.options.clone()
    }
}

/// Options for consumers that should see redeliveries quickly
pub fn fast_redelivery() -> ConsumerOptions {
    ConsumerOptions {
        visibility_timeout: Some(Duration::from_secs(1)),
        handle_timeout: Some(Duration::from_secs(2)),
        ..Default::default()
    }
}

// ============================================================================
// Polling helpers
// ============================================================================

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
