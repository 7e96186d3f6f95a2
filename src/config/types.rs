use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupSettings,
    #[serde(default)]
    pub retention: RetentionSettings,
    #[serde(default)]
    pub s3: Option<S3Settings>,
    #[serde(default)]
    pub docker: DockerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// What gets backed up and where the artifact is staged
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupSettings {
    /// Directory tree archived on every run
    #[serde(default = "default_sources")]
    pub sources: PathBuf,

    /// strftime-style template for the archive name
    #[serde(default = "default_filename")]
    pub filename: String,

    /// Directory the artifact is built and encrypted in
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,

    /// Local archive directory receiving a copy of every backup
    #[serde(default)]
    pub archive: Option<PathBuf>,

    /// Value of the `docker-volume-backup.stop-during-backup` label to match.
    /// Empty matches any container carrying the label.
    #[serde(default = "default_stop_label")]
    pub stop_during_backup_label: String,

    #[serde(default)]
    pub encryption_passphrase: Option<String>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            filename: default_filename(),
            working_directory: default_working_directory(),
            archive: None,
            stop_during_backup_label: default_stop_label(),
            encryption_passphrase: None,
        }
    }
}

/// Age-based pruning of old backups
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionSettings {
    /// Pruning is disabled when unset
    #[serde(default)]
    pub days: Option<u32>,

    /// Delay before pruning starts, Go duration notation ("1m", "30s")
    #[serde(default = "default_pruning_leeway")]
    pub pruning_leeway: String,

    #[serde(default)]
    pub pruning_prefix: String,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            days: None,
            pruning_leeway: default_pruning_leeway(),
            pruning_prefix: String::new(),
        }
    }
}

/// Resolved retention policy handed to the pruner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub retention_days: Option<u32>,
    pub pruning_leeway: Duration,
    pub pruning_prefix: String,
}

impl RetentionPolicy {
    pub fn disabled() -> Self {
        Self {
            retention_days: None,
            pruning_leeway: Duration::ZERO,
            pruning_prefix: String::new(),
        }
    }
}

/// S3-compatible remote bucket
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Settings {
    pub bucket: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_endpoint_proto")]
    pub endpoint_proto: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default)]
    pub secret_access_key: String,
}

impl S3Settings {
    pub fn for_bucket(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            endpoint: default_endpoint(),
            endpoint_proto: default_endpoint_proto(),
            region: default_region(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

/// Container engine access
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DockerSettings {
    /// Force the engine on or off; unset means "on if the socket exists"
    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default = "default_docker_socket")]
    pub socket: PathBuf,

    #[serde(default = "default_docker_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            enabled: None,
            socket: default_docker_socket(),
            timeout_seconds: default_docker_timeout(),
        }
    }
}

impl DockerSettings {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or_else(|| self.socket.exists())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Console-only logging when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_max_files")]
    pub max_files: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: None,
            level: default_log_level(),
            max_files: default_log_max_files(),
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub webhook_url: String,

    #[serde(default = "default_notify_on")]
    pub notify_on: Vec<NotifyEvent>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            notify_on: default_notify_on(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifyEvent {
    Failure,
    Success,
}

// Default value functions

fn default_sources() -> PathBuf { PathBuf::from("/backup") }
fn default_filename() -> String { "backup-%Y-%m-%dT%H-%M-%S.tar.gz".to_string() }
fn default_working_directory() -> PathBuf { PathBuf::from("/tmp") }
fn default_stop_label() -> String { "true".to_string() }
fn default_pruning_leeway() -> String { "1m".to_string() }
fn default_endpoint() -> String { "s3.amazonaws.com".to_string() }
fn default_endpoint_proto() -> String { "https".to_string() }
fn default_region() -> String { "us-east-1".to_string() }
fn default_docker_socket() -> PathBuf { PathBuf::from("/var/run/docker.sock") }
fn default_docker_timeout() -> u64 { 120 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
fn default_notify_on() -> Vec<NotifyEvent> {
    vec![NotifyEvent::Failure]
}
