//! Configuration module for volume-backup
//!
//! This module handles loading, validating, and resolving configuration.
//!
//! ## Configuration Layers
//!
//! Settings are applied in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. TOML configuration file (if given)
//! 3. Env file (exported into the process environment)
//! 4. Environment variables (`BACKUP_*`, `AWS_*`, `GPG_PASSPHRASE`, ...)
//!
//! ## Example Usage
//!
//! ```no_run
//! use volume_backup::config;
//! use std::path::Path;
//!
//! let config = config::load_config(Some(Path::new("backup.toml")), None)?;
//! let policy = config::resolve_retention(&config)?;
//! println!("Keeping backups for {:?} days", policy.retention_days);
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{
    apply_env_overrides, load_config, parse_duration, resolve_retention, validate_config,
    ConfigError, Result,
};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backup.sources, PathBuf::from("/backup"));
        assert_eq!(config.backup.working_directory, PathBuf::from("/tmp"));
        assert_eq!(config.backup.stop_during_backup_label, "true");
        assert!(config.backup.archive.is_none());
        assert!(config.retention.days.is_none());
        assert_eq!(config.retention.pruning_leeway, "1m");
        assert!(config.s3.is_none());
        assert_eq!(config.notifications.notify_on, vec![NotifyEvent::Failure]);
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
[backup]
sources = "/data"
archive = "/archive"
stop_during_backup_label = ""

[retention]
days = 7
pruning_leeway = "0s"
pruning_prefix = "backup-"

[s3]
bucket = "my-bucket"
endpoint = "minio:9000"
endpoint_proto = "http"
"#,
        )
        .unwrap();

        assert_eq!(config.backup.sources, PathBuf::from("/data"));
        assert_eq!(config.backup.archive, Some(PathBuf::from("/archive")));
        assert_eq!(config.backup.stop_during_backup_label, "");
        assert_eq!(config.retention.days, Some(7));
        let s3 = config.s3.unwrap();
        assert_eq!(s3.bucket, "my-bucket");
        assert_eq!(s3.region, "us-east-1");
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_expand_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_tilde(&path);
        assert!(!expanded.starts_with("~"));

        let path = PathBuf::from("/absolute/path");
        let expanded = expand_tilde(&path);
        assert_eq!(expanded, path);
    }
}
