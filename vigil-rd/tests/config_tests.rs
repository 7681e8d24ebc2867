//! vigil-rd configuration loading tests
//!
//! Tests that touch VIGIL_RD_CONFIG are marked with #[serial].

use serial_test::serial;
use std::env;
use vigil_common::config::ConfigPathResolver;
use vigil_rd::config::EngineConfig;

#[test]
#[serial]
fn test_env_var_selects_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vigil-rd.toml");
    std::fs::write(
        &path,
        "[server]\nport = 6100\n\n[risk]\nsustained_window_secs = 120\n",
    )
    .unwrap();

    env::set_var("VIGIL_RD_CONFIG", &path);
    let resolved = ConfigPathResolver::new("vigil-rd").resolve(None);
    env::remove_var("VIGIL_RD_CONFIG");

    assert_eq!(resolved.as_deref(), Some(path.as_path()));
    let config = EngineConfig::load(resolved.as_deref()).unwrap();
    assert_eq!(config.server.port, 6100);
    assert_eq!(config.risk.sustained_window_secs, 120);
    assert_eq!(config.risk.safety_timeout_secs, 1800);
}

#[test]
#[serial]
fn test_invalid_thresholds_fail_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vigil-rd.toml");
    std::fs::write(&path, "[risk]\nelevated_threshold = 0.9\nhigh_threshold = 0.5\n").unwrap();

    assert!(EngineConfig::load(Some(&path)).is_err());
}

#[test]
fn test_default_config_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("written.toml");

    vigil_common::config::write_toml_config(&EngineConfig::default(), &path).unwrap();
    let loaded = EngineConfig::load(Some(&path)).unwrap();

    assert_eq!(loaded.server.port, EngineConfig::default().server.port);
    assert_eq!(loaded.alert.max_attempts, 8);
}
