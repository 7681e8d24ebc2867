//! Integration tests for configuration resolution and graceful degradation
//!
//! Uses serial_test to prevent ENV variable race conditions: tests that set
//! VIGIL_*_CONFIG are marked with #[serial].

use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::env;
use vigil_common::config::{load_toml_or_default, write_toml_config, ConfigPathResolver, LoggingConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct SampleConfig {
    port: u16,
    logging: LoggingConfig,
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let config: SampleConfig = load_toml_or_default(Some(&path)).unwrap();
    assert_eq!(config, SampleConfig::default());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_no_path_falls_back_to_defaults() {
    let config: SampleConfig = load_toml_or_default(None).unwrap();
    assert_eq!(config.port, 0);
}

#[test]
fn test_partial_file_keeps_defaults_for_missing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.toml");
    std::fs::write(&path, "port = 5810\n").unwrap();

    let config: SampleConfig = load_toml_or_default(Some(&path)).unwrap();
    assert_eq!(config.port, 5810);
    assert_eq!(config.logging, LoggingConfig::default());
}

#[test]
fn test_unparsable_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "port = [not valid").unwrap();

    let result: vigil_common::Result<SampleConfig> = load_toml_or_default(Some(&path));
    assert!(matches!(result, Err(vigil_common::Error::Config(_))));
}

#[test]
fn test_write_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("written.toml");
    let config = SampleConfig {
        port: 6001,
        logging: LoggingConfig {
            level: "debug".to_string(),
            json: true,
        },
    };

    write_toml_config(&config, &path).unwrap();
    let loaded: SampleConfig = load_toml_or_default(Some(&path)).unwrap();
    assert_eq!(loaded, config);
}

#[test]
#[serial]
fn test_env_var_resolution() {
    let resolver = ConfigPathResolver::new("vigil-envtest");
    env::set_var("VIGIL_ENVTEST_CONFIG", "/tmp/vigil-envtest.toml");

    let resolved = resolver.resolve(None);
    env::remove_var("VIGIL_ENVTEST_CONFIG");

    assert_eq!(
        resolved,
        Some(std::path::PathBuf::from("/tmp/vigil-envtest.toml"))
    );
}

#[test]
#[serial]
fn test_cli_overrides_env_var() {
    let resolver = ConfigPathResolver::new("vigil-envtest");
    env::set_var("VIGIL_ENVTEST_CONFIG", "/tmp/from-env.toml");

    let cli = std::path::PathBuf::from("/tmp/from-cli.toml");
    let resolved = resolver.resolve(Some(&cli));
    env::remove_var("VIGIL_ENVTEST_CONFIG");

    assert_eq!(resolved, Some(cli));
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    let resolver = ConfigPathResolver::new("vigil-blanktest");
    env::set_var("VIGIL_BLANKTEST_CONFIG", "   ");

    let resolved = resolver.resolve(None);
    env::remove_var("VIGIL_BLANKTEST_CONFIG");

    // Falls through to directory candidates, which do not exist for this module
    assert_eq!(resolved, None);
}
