//! Unit tests for configuration loading and validation
//!
//! Environment variables are process-wide, so tests touching them run serially.

use serial_test::serial;
use std::env;
use test_utils::{minimal_config_toml, ConfigBuilder, ResultAssertions, TestContext};
use volume_backup::config::{load_config, resolve_retention};

const ENV_KEYS: &[&str] = &[
    "BACKUP_RETENTION_DAYS",
    "BACKUP_PRUNING_PREFIX",
    "BACKUP_STOP_CONTAINER_LABEL",
    "AWS_S3_BUCKET_NAME",
    "AWS_ENDPOINT_PROTO",
];

fn clear_env() {
    for key in ENV_KEYS {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_config_loading_valid() {
    clear_env();
    let ctx = TestContext::new();
    let config_path = ctx.create_file("config.toml", minimal_config_toml());

    let config = load_config(Some(&config_path), None).assert_ok();
    assert_eq!(config.retention.days, Some(7));
    assert_eq!(config.retention.pruning_prefix, "backup-");
    assert_eq!(config.docker.enabled, Some(false));
}

#[test]
#[serial]
fn test_builder_config_loads() {
    clear_env();
    let builder = ConfigBuilder::new().with_archive().with_retention(14);
    let config_path = builder.write_toml();

    let config = load_config(Some(&config_path), None).assert_ok();
    let policy = resolve_retention(&config).assert_ok();
    assert_eq!(policy.retention_days, Some(14));
    assert!(policy.pruning_leeway.is_zero());
}

#[test]
#[serial]
fn test_invalid_toml() {
    clear_env();
    let ctx = TestContext::new();
    let config_path = ctx.create_file("config.toml", "invalid { toml content");

    assert!(load_config(Some(&config_path), None).is_err());
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    let ctx = TestContext::new();
    let config_path = ctx.create_file("config.toml", minimal_config_toml());

    env::set_var("BACKUP_RETENTION_DAYS", "30");
    env::set_var("BACKUP_STOP_CONTAINER_LABEL", "nightly");
    let result = load_config(Some(&config_path), None);
    clear_env();

    let config = result.assert_ok();
    assert_eq!(config.retention.days, Some(30));
    assert_eq!(config.backup.stop_during_backup_label, "nightly");
}

#[test]
#[serial]
fn test_env_file_is_applied() {
    clear_env();
    let ctx = TestContext::new();
    let env_file = ctx.create_file(
        "backup.env",
        "AWS_S3_BUCKET_NAME=nightly-backups\nBACKUP_PRUNING_PREFIX=nightly-\n",
    );

    let result = load_config(None, Some(&env_file));
    clear_env();

    let config = result.assert_ok();
    assert_eq!(config.s3.unwrap().bucket, "nightly-backups");
    assert_eq!(config.retention.pruning_prefix, "nightly-");
}

#[test]
#[serial]
fn test_invalid_retention_days_rejected() {
    clear_env();
    env::set_var("BACKUP_RETENTION_DAYS", "a week");
    let result = load_config(None, None);
    clear_env();

    result.assert_err_contains("BACKUP_RETENTION_DAYS");
}

#[test]
#[serial]
fn test_invalid_endpoint_protocol_rejected() {
    clear_env();
    env::set_var("AWS_S3_BUCKET_NAME", "bucket");
    env::set_var("AWS_ENDPOINT_PROTO", "ftp");
    let result = load_config(None, None);
    clear_env();

    assert!(result.is_err());
}
