//! Process-wide settings consumed by the pub/sub core.
//!
//! Every struct deserializes with `#[serde(default)]`, so a configuration
//! source only needs to name the values it overrides.

use pubsub_runtime::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

/// Deployment environment the process runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    #[default]
    Production,
    Test,
}

impl Environment {
    /// Test environments create consumers without starting them and poll
    /// with a short wait time so that stops are prompt
    pub fn is_test(&self) -> bool {
        matches!(self, Self::Test)
    }
}

/// Per-queue defaults applied when a queue definition leaves a value unset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueDefaults {
    /// Number of consumers started per queue
    pub consumer_count: u32,
    /// Deliveries before the transport moves a message to the dead-letter queue
    pub max_receive_count: u32,
}

impl Default for QueueDefaults {
    fn default() -> Self {
        Self {
            consumer_count: 1,
            max_receive_count: 5,
        }
    }
}

/// Consumer polling defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerDefaults {
    pub handle_timeout_ms: u64,
    pub visibility_timeout_seconds: u64,
    pub wait_time_seconds: u64,
    /// Pause between polls
    pub polling_wait_ms: u64,
    /// Pause after a poll was rejected for bad credentials
    pub authentication_error_timeout_ms: u64,
    /// Long-poll wait used in the test environment
    pub test_wait_time_seconds: u64,
}

impl ConsumerDefaults {
    pub fn handle_timeout(&self) -> Duration {
        Duration::from_millis(self.handle_timeout_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_seconds)
    }

    pub fn polling_wait(&self) -> Duration {
        Duration::from_millis(self.polling_wait_ms)
    }

    pub fn authentication_error_timeout(&self) -> Duration {
        Duration::from_millis(self.authentication_error_timeout_ms)
    }

    pub fn test_wait_time(&self) -> Duration {
        Duration::from_secs(self.test_wait_time_seconds)
    }
}

impl Default for ConsumerDefaults {
    fn default() -> Self {
        Self {
            handle_timeout_ms: 10_000,
            visibility_timeout_seconds: 30,
            wait_time_seconds: 20,
            polling_wait_ms: 0,
            authentication_error_timeout_ms: 10_000,
            test_wait_time_seconds: 1,
        }
    }
}

/// Top-level pub/sub settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubSettings {
    pub environment: Environment,
    /// Appended to every queue name as `-<suffix>` when non-empty
    pub queue_suffix: Option<String>,
    pub defaults: QueueDefaults,
    pub consumer: ConsumerDefaults,
    pub provider: ProviderConfig,
}

impl PubSubSettings {
    /// Settings for tests: test environment, in-memory provider
    pub fn for_tests() -> Self {
        Self {
            environment: Environment::Test,
            ..Default::default()
        }
    }

    /// The configured suffix, ignoring blank values
    pub fn effective_suffix(&self) -> Option<&str> {
        self.queue_suffix
            .as_deref()
            .map(str::trim)
            .filter(|suffix| !suffix.is_empty())
    }
}
