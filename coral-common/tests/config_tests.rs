//! Configuration file resolution and loading
//!
//! Tests that set or clear CORAL_CONFIG are marked with #[serial] so they do not race on
//! the process environment.

use coral_common::config::{resolve_config_path, TomlConfig, CONFIG_ENV_VAR};
use coral_common::Error;
use serial_test::serial;
use std::env;
use std::fs;

fn write_config(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
#[serial]
async fn test_environment_variable_selects_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "env.toml", "port = 9200\n[histogram]\nbins = 20\n");
    env::set_var(CONFIG_ENV_VAR, &path);

    let (config, loaded_from) = TomlConfig::load(None).await.unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(loaded_from.as_deref(), Some(path.as_path()));
    assert_eq!(config.port, 9200);
    assert_eq!(config.histogram.bins, 20);
    assert_eq!(config.cluster.elbow_threshold, 0.1);
}

#[tokio::test]
#[serial]
async fn test_command_line_path_wins_over_environment() {
    let dir = tempfile::tempdir().unwrap();
    let env_path = write_config(&dir, "env.toml", "port = 9200\n");
    let cli_path = write_config(&dir, "cli.toml", "port = 9300\n");
    env::set_var(CONFIG_ENV_VAR, &env_path);

    let (config, loaded_from) = TomlConfig::load(Some(cli_path.as_path())).await.unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(loaded_from.as_deref(), Some(cli_path.as_path()));
    assert_eq!(config.port, 9300);
}

#[test]
#[serial]
fn test_environment_variable_pointing_nowhere_is_an_error() {
    env::set_var(CONFIG_ENV_VAR, "/nonexistent/coral/config.toml");
    let result = resolve_config_path(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
#[serial]
async fn test_invalid_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "bad.toml", "[cluster]\nmin_cluster_fraction = 2.0\n");

    let err = TomlConfig::load(Some(path.as_path())).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(!err.is_client_error());
}
