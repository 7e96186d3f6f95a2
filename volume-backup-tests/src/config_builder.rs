//! Fluent API for building test configurations
//!
//! Provides a builder pattern for creating test configurations with sensible defaults.
//! Every builder owns a temporary directory holding the backup source, the
//! working directory and the local archive directory.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use volume_backup::config::{Config, NotificationConfig, S3Settings};

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    config: Config,
}

impl ConfigBuilder {
    /// Source with one data file, a working directory and no storage targets
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let sources = temp_dir.path().join("backup");
        fs::create_dir_all(&sources).expect("Failed to create source dir");
        fs::write(sources.join("data.txt"), "volume contents").expect("Failed to write source file");

        let working_directory = temp_dir.path().join("work");
        fs::create_dir_all(&working_directory).expect("Failed to create working dir");

        let mut config = Config::default();
        config.backup.sources = sources;
        config.backup.working_directory = working_directory;
        config.backup.filename = "backup-%Y-%m-%dT%H-%M-%S.tar.gz".to_string();
        config.retention.pruning_leeway = "0s".to_string();
        config.docker.enabled = Some(false);

        Self { temp_dir, config }
    }

    /// Add a local archive directory named `archive`
    pub fn with_archive(mut self) -> Self {
        let archive = self.temp_dir.path().join("archive");
        fs::create_dir_all(&archive).expect("Failed to create archive dir");
        self.config.backup.archive = Some(archive);
        self
    }

    /// Point the local archive at a directory that is not created
    pub fn with_missing_archive(mut self) -> Self {
        self.config.backup.archive = Some(self.temp_dir.path().join("missing-archive"));
        self
    }

    pub fn with_filename(mut self, template: &str) -> Self {
        self.config.backup.filename = template.to_string();
        self
    }

    pub fn with_stop_label(mut self, value: &str) -> Self {
        self.config.backup.stop_during_backup_label = value.to_string();
        self
    }

    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.config.backup.encryption_passphrase = Some(passphrase.to_string());
        self
    }

    /// Enable pruning with a zero leeway
    pub fn with_retention(mut self, days: u32) -> Self {
        self.config.retention.days = Some(days);
        self
    }

    pub fn with_pruning_prefix(mut self, prefix: &str) -> Self {
        self.config.retention.pruning_prefix = prefix.to_string();
        self
    }

    pub fn with_pruning_leeway(mut self, leeway: &str) -> Self {
        self.config.retention.pruning_leeway = leeway.to_string();
        self
    }

    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.config.s3 = Some(S3Settings::for_bucket(bucket));
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationConfig) -> Self {
        self.config.notifications = notifications;
        self
    }

    /// Get the temp directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn sources(&self) -> &Path {
        &self.config.backup.sources
    }

    pub fn working_directory(&self) -> &Path {
        &self.config.backup.working_directory
    }

    pub fn archive(&self) -> Option<PathBuf> {
        self.config.backup.archive.clone()
    }

    /// Build the Config, dropping the temp directory
    pub fn build(self) -> Config {
        self.config
    }

    /// Keep the temp directory alive alongside the config
    pub fn persist(self) -> (Config, TempDir) {
        (self.config, self.temp_dir)
    }

    /// Serialize the config to TOML and write it to `config.toml` in the temp dir
    pub fn write_toml(&self) -> PathBuf {
        let path = self.temp_dir.path().join("config.toml");
        let content = toml::to_string_pretty(&self.config).expect("Failed to serialize config");
        fs::write(&path, content).expect("Failed to write config file");
        path
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_source_and_work_dirs() {
        let builder = ConfigBuilder::new();
        assert!(builder.sources().join("data.txt").exists());
        assert!(builder.working_directory().is_dir());
        assert!(builder.archive().is_none());
    }

    #[test]
    fn test_retention_and_archive() {
        let (config, _temp_dir) = ConfigBuilder::new()
            .with_archive()
            .with_retention(7)
            .with_pruning_prefix("backup-")
            .persist();

        assert_eq!(config.retention.days, Some(7));
        assert_eq!(config.retention.pruning_prefix, "backup-");
        assert!(config.backup.archive.unwrap().is_dir());
    }

    #[test]
    fn test_write_toml_round_trips_through_loader() {
        let builder = ConfigBuilder::new().with_archive().with_retention(3);
        let path = builder.write_toml();

        let loaded = volume_backup::config::load_config(Some(&path), None).unwrap();
        assert_eq!(loaded.retention.days, Some(3));
        assert_eq!(loaded.backup.archive, builder.archive());
    }
}
