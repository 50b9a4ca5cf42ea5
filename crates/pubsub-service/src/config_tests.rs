//! Tests for service configuration loading

use super::*;
use pubsub_core::Environment;
use pubsub_runtime::ProviderConfig;
use serial_test::serial;
use std::io::Write;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> String {
    let path = dir.path().join("service.yaml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path.to_string_lossy().into_owned()
}

fn missing_path(dir: &TempDir) -> String {
    dir.path().join("absent").to_string_lossy().into_owned()
}

mod validation {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_consumer_count_is_rejected() {
        let mut config = ServiceConfig::default();
        config.pubsub.defaults.consumer_count = 0;

        let err = config.validate().unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid { ref field, .. } if field == "pubsub.defaults.consumer_count"
        ));
    }

    #[test]
    fn test_out_of_range_consumer_values_are_rejected() {
        let mut zero_receive = ServiceConfig::default();
        zero_receive.pubsub.defaults.max_receive_count = 0;

        let mut zero_timeout = ServiceConfig::default();
        zero_timeout.pubsub.consumer.handle_timeout_ms = 0;

        let mut long_wait = ServiceConfig::default();
        long_wait.pubsub.consumer.wait_time_seconds = 21;

        let mut long_visibility = ServiceConfig::default();
        long_visibility.pubsub.consumer.visibility_timeout_seconds = 12 * 60 * 60 + 1;

        for config in [zero_receive, zero_timeout, long_wait, long_visibility] {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { .. })),
                "expected {:?} to be rejected",
                config.pubsub
            );
        }
    }
}

mod loading {
    use super::*;

    #[test]
    #[serial]
    fn test_absent_files_yield_defaults() {
        let dir = TempDir::new().unwrap();

        let config = load_from(&[missing_path(&dir).as_str()], None).unwrap();

        assert_eq!(config.pubsub.environment, Environment::Production);
        assert_eq!(config.pubsub.defaults.consumer_count, 1);
        assert!(!config.logging.json_format);
        assert!(matches!(config.pubsub.provider, ProviderConfig::InMemory(_)));
    }

    #[test]
    #[serial]
    fn test_yaml_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
pubsub:
  environment: development
  queue_suffix: staging
  defaults:
    consumer_count: 3
  provider:
    type: aws_sqs
    region: eu-west-1
logging:
  json_format: true
"#,
        );

        let config = load_from(&[path.as_str()], None).unwrap();

        assert_eq!(config.pubsub.environment, Environment::Development);
        assert_eq!(config.pubsub.effective_suffix(), Some("staging"));
        assert_eq!(config.pubsub.defaults.consumer_count, 3);
        assert_eq!(config.pubsub.defaults.max_receive_count, 5);
        assert!(config.logging.json_format);
        match config.pubsub.provider {
            ProviderConfig::AwsSqs(aws) => assert_eq!(aws.region, "eu-west-1"),
            other => panic!("expected AWS provider, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();

        let err = load_from(&[], Some(&missing_path(&dir))).unwrap_err();

        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
pubsub:
  defaults:
    consumer_count: 3
"#,
        );
        std::env::set_var("PUBSUB__PUBSUB__DEFAULTS__CONSUMER_COUNT", "4");
        std::env::set_var("PUBSUB__PUBSUB__ENVIRONMENT", "test");

        let result = load_from(&[], Some(&path));

        std::env::remove_var("PUBSUB__PUBSUB__DEFAULTS__CONSUMER_COUNT");
        std::env::remove_var("PUBSUB__PUBSUB__ENVIRONMENT");

        let config = result.unwrap();
        assert_eq!(config.pubsub.defaults.consumer_count, 4);
        assert_eq!(config.pubsub.environment, Environment::Test);
    }

    #[test]
    #[serial]
    fn test_invalid_loaded_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
pubsub:
  consumer:
    wait_time_seconds: 30
"#,
        );

        let err = load_from(&[path.as_str()], None).unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid { ref field, .. } if field == "pubsub.consumer.wait_time_seconds"
        ));
    }

    #[test]
    #[serial]
    fn test_explicit_path_comes_from_environment() {
        std::env::set_var(CONFIG_FILE_ENV, "/srv/pubsub/service.yaml");
        let set = explicit_path();
        std::env::set_var(CONFIG_FILE_ENV, "");
        let empty = explicit_path();
        std::env::remove_var(CONFIG_FILE_ENV);

        assert_eq!(set.as_deref(), Some("/srv/pubsub/service.yaml"));
        assert_eq!(empty, None);
        assert_eq!(explicit_path(), None);
    }
}
