/*!
 * Tests for application configuration functionality
 */

use std::time::Duration;

use booktrans::app_config::{CUSTOM_ENDPOINT_KEY, Config, Credentials, LogLevel, SelectionMode};
use booktrans::errors::ConfigError;

use crate::common::{create_temp_dir, create_test_file};

/// Test loading a settings file written by hand
#[test]
fn test_load_withSelectionAndFilterKeys_shouldApplyThem() {
    let dir = create_temp_dir().unwrap();
    let path = create_test_file(
        dir.path(),
        "conf.json",
        r#"{
  "model": "qwen/qwen3-235b",
  "chapterSelection": {"mode": "csv", "csv": "1, 4-5"},
  "contextFilterEnabled": true,
  "contextFilterCharacters": true,
  "contextFilterTerms": false,
  "concurrentWorkers": 3,
  "logLevel": "debug"
}"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();

    assert_eq!(config.chapter_selection.mode, SelectionMode::Csv);
    assert_eq!(config.chapter_selection.resolve(6).unwrap(), vec![1, 4, 5]);
    let categories = config.filter_categories();
    assert!(categories.characters && categories.places && !categories.terms);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.sampling_params().model, "qwen/qwen3-235b");
}

/// Test the custom endpoint credentials
#[test]
fn test_validate_withCustomEndpoint_shouldRequireEndpointKey() {
    let config = Config {
        use_custom_endpoint: true,
        ..Config::default()
    };
    let openrouter_only = Credentials {
        openrouter_api_key: Some("sk-or".into()),
        ..Credentials::default()
    };

    match config.validate(&openrouter_only) {
        Err(ConfigError::MissingCredential(name)) => assert_eq!(name, CUSTOM_ENDPOINT_KEY),
        other => panic!("unexpected result: {:?}", other),
    }

    let custom = Credentials {
        custom_endpoint_key: Some("ck".into()),
        custom_endpoint_url: Some("http://localhost:8000/v1".into()),
        ..Credentials::default()
    };
    assert!(config.validate(&custom).is_ok());
    assert_eq!(config.endpoint_url(&custom), "http://localhost:8000/v1");
    assert_eq!(config.endpoint_url(&Credentials::default()), config.custom_endpoint_url);
}

#[test]
fn test_validate_withOutOfRangeSampling_shouldReject() {
    let credentials = Credentials {
        openrouter_api_key: Some("sk-or".into()),
        ..Credentials::default()
    };
    let hot = Config {
        temperature: 3.5,
        ..Config::default()
    };
    let negative_timeout = Config {
        timeout: -1.0,
        ..Config::default()
    };

    assert!(matches!(hot.validate(&credentials), Err(ConfigError::InvalidValue { .. })));
    assert!(matches!(negative_timeout.validate(&credentials), Err(ConfigError::InvalidValue { .. })));
}

#[test]
fn test_timeoutDuration_withFractionalSeconds_shouldKeepMillis() {
    let config = Config {
        timeout: 2.5,
        ..Config::default()
    };

    assert_eq!(config.timeout_duration(), Duration::from_millis(2500));
}

#[test]
fn test_effectiveWorkers_shouldClampToJobCount() {
    let config = Config {
        concurrent_workers: 8,
        ..Config::default()
    };

    assert_eq!(config.effective_workers(3), 3);
    assert_eq!(config.effective_workers(0), 1);
    assert_eq!(Config::default().effective_workers(10), 1);
}
