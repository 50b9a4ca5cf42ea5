//! Service configuration and its layered loading.
//!
//! Sources, later ones overriding earlier ones:
//!  1. `/etc/pubsub/service.yaml`
//!  2. `./config/service.yaml`
//!  3. the file named by `PUBSUB_CONFIG_FILE` (must exist when set)
//!  4. environment variables prefixed `PUBSUB__`, double-underscore separated,
//!     e.g. `PUBSUB__PUBSUB__QUEUE_SUFFIX=staging` sets `pubsub.queue_suffix`
//!
//! Every field carries a serde default, so an unconfigured host still yields
//! a usable configuration.

use pubsub_core::{ConsumerSettings, PubSubSettings};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "PUBSUB";

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "PUBSUB_CONFIG_FILE";

/// Configuration files probed when present, lowest precedence first
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["/etc/pubsub/service", "config/service"];

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Queue registration and consumer settings
    pub pubsub: PubSubSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "pubsub_service=info,pubsub_core=info,pubsub_runtime=info".to_string(),
            json_format: false,
        }
    }
}

impl ServiceConfig {
    /// Reject values no consumer could run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let defaults = &self.pubsub.defaults;
        if defaults.consumer_count == 0 {
            return Err(ConfigError::invalid(
                "pubsub.defaults.consumer_count",
                "must be at least 1",
            ));
        }
        if defaults.max_receive_count == 0 {
            return Err(ConfigError::invalid(
                "pubsub.defaults.max_receive_count",
                "must be at least 1",
            ));
        }

        let consumer = &self.pubsub.consumer;
        if consumer.handle_timeout().is_zero() {
            return Err(ConfigError::invalid(
                "pubsub.consumer.handle_timeout_ms",
                "must be greater than zero",
            ));
        }
        if consumer.wait_time() > ConsumerSettings::MAX_WAIT_TIME {
            return Err(ConfigError::invalid(
                "pubsub.consumer.wait_time_seconds",
                format!(
                    "must not exceed {}s",
                    ConsumerSettings::MAX_WAIT_TIME.as_secs()
                ),
            ));
        }
        if consumer.visibility_timeout() > ConsumerSettings::MAX_VISIBILITY_TIMEOUT {
            return Err(ConfigError::invalid(
                "pubsub.consumer.visibility_timeout_seconds",
                format!(
                    "must not exceed {}s",
                    ConsumerSettings::MAX_VISIBILITY_TIMEOUT.as_secs()
                ),
            ));
        }

        Ok(())
    }
}

/// File named by `PUBSUB_CONFIG_FILE`, if set and non-empty
pub fn explicit_path() -> Option<String> {
    std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|path| !path.is_empty())
}

/// Load and validate configuration from the standard sources
pub fn load() -> Result<ServiceConfig, ConfigError> {
    load_from(&DEFAULT_CONFIG_PATHS, explicit_path().as_deref())
}

/// Load and validate configuration from the given files plus the environment
///
/// `optional_paths` are skipped when absent; `explicit_path` must exist.
pub fn load_from(
    optional_paths: &[&str],
    explicit_path: Option<&str>,
) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder();
    for path in optional_paths {
        builder = builder.add_source(
            config::File::with_name(path)
                .required(false)
                .format(config::FileFormat::Yaml),
        );
    }

    if let Some(path) = explicit_path {
        builder = builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let service_config: ServiceConfig = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()?;

    service_config.validate()?;
    Ok(service_config)
}
