use super::types::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to load env file {path:?}: {reason}")]
    EnvFileError { path: PathBuf, reason: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load configuration from the optional TOML file, the optional env file and
/// the process environment, in that order of precedence (lowest first).
pub fn load_config(config_path: Option<&Path>, env_file: Option<&Path>) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => {
            let contents = fs::read_to_string(path)?;
            toml::from_str(&contents)?
        }
        None => Config::default(),
    };

    if let Some(path) = env_file {
        load_env_file(path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Export the variables of an env file into the process environment.
/// Variables already set in the environment win over the file.
fn load_env_file(path: &Path) -> Result<()> {
    dotenv::from_path(path).map_err(|e| ConfigError::EnvFileError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Override configuration values from environment variables
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("BACKUP_SOURCES") {
        config.backup.sources = PathBuf::from(v);
    }
    if let Some(v) = lookup("BACKUP_FILENAME") {
        config.backup.filename = v;
    }
    if let Some(v) = lookup("BACKUP_WORKING_DIRECTORY") {
        config.backup.working_directory = PathBuf::from(v);
    }
    if let Some(v) = lookup("BACKUP_ARCHIVE") {
        config.backup.archive = non_empty(v).map(PathBuf::from);
    }
    if let Some(v) = lookup("BACKUP_STOP_CONTAINER_LABEL") {
        config.backup.stop_during_backup_label = v;
    }
    if let Some(v) = lookup("GPG_PASSPHRASE") {
        config.backup.encryption_passphrase = non_empty(v);
    }

    if let Some(v) = lookup("BACKUP_RETENTION_DAYS") {
        config.retention.days = match non_empty(v) {
            Some(days) => Some(days.trim().parse::<u32>().map_err(|e| {
                ConfigError::InvalidValue {
                    key: "BACKUP_RETENTION_DAYS".to_string(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };
    }
    if let Some(v) = lookup("BACKUP_PRUNING_LEEWAY") {
        config.retention.pruning_leeway = v;
    }
    if let Some(v) = lookup("BACKUP_PRUNING_PREFIX") {
        config.retention.pruning_prefix = v;
    }

    if let Some(bucket) = lookup("AWS_S3_BUCKET_NAME") {
        config.s3 = match non_empty(bucket) {
            Some(bucket) => {
                let mut s3 = config
                    .s3
                    .take()
                    .unwrap_or_else(|| S3Settings::for_bucket(&bucket));
                s3.bucket = bucket;
                Some(s3)
            }
            None => None,
        };
    }
    if let Some(s3) = config.s3.as_mut() {
        if let Some(v) = lookup("AWS_ENDPOINT") {
            s3.endpoint = v;
        }
        if let Some(v) = lookup("AWS_ENDPOINT_PROTO") {
            s3.endpoint_proto = v;
        }
        if let Some(v) = lookup("AWS_DEFAULT_REGION") {
            s3.region = v;
        }
        if let Some(v) = lookup("AWS_ACCESS_KEY_ID") {
            s3.access_key_id = v;
        }
        if let Some(v) = lookup("AWS_SECRET_ACCESS_KEY") {
            s3.secret_access_key = v;
        }
    }

    if let Some(v) = lookup("BACKUP_DOCKER_ENABLED") {
        config.docker.enabled = Some(parse_bool("BACKUP_DOCKER_ENABLED", &v)?);
    }

    if let Some(v) = lookup("BACKUP_LOG_DIRECTORY") {
        config.logging.directory = non_empty(v).map(PathBuf::from);
    }
    if let Some(v) = lookup("BACKUP_LOG_LEVEL") {
        config.logging.level = v;
    }

    if let Some(v) = lookup("NOTIFICATION_URL") {
        config.notifications.webhook_url = v;
    }
    if let Some(v) = lookup("NOTIFICATION_LEVEL") {
        config.notifications.notify_on = match v.to_lowercase().as_str() {
            "error" => vec![NotifyEvent::Failure],
            "info" => vec![NotifyEvent::Failure, NotifyEvent::Success],
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "NOTIFICATION_LEVEL".to_string(),
                    reason: format!("expected 'error' or 'info', got '{}'", other),
                })
            }
        };
    }

    Ok(())
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.backup.filename.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "Backup filename template is empty".to_string(),
        ));
    }

    if config.backup.sources.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "Backup source directory is empty".to_string(),
        ));
    }

    parse_duration(&config.retention.pruning_leeway).map_err(|reason| {
        ConfigError::InvalidValue {
            key: "pruning_leeway".to_string(),
            reason,
        }
    })?;

    if let Some(ref s3) = config.s3 {
        if s3.bucket.is_empty() {
            return Err(ConfigError::ValidationError(
                "S3 bucket name is empty".to_string(),
            ));
        }
        if s3.endpoint.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "S3 bucket '{}' configured without an endpoint",
                s3.bucket
            )));
        }
        if s3.endpoint_proto != "http" && s3.endpoint_proto != "https" {
            return Err(ConfigError::InvalidValue {
                key: "endpoint_proto".to_string(),
                reason: format!("expected 'http' or 'https', got '{}'", s3.endpoint_proto),
            });
        }
    }

    Ok(())
}

/// Resolve the retention settings into a policy for the pruner
pub fn resolve_retention(config: &Config) -> Result<RetentionPolicy> {
    let pruning_leeway = parse_duration(&config.retention.pruning_leeway).map_err(|reason| {
        ConfigError::InvalidValue {
            key: "pruning_leeway".to_string(),
            reason,
        }
    })?;

    Ok(RetentionPolicy {
        retention_days: config.retention.days,
        pruning_leeway,
        pruning_prefix: config.retention.pruning_prefix.clone(),
    })
}

/// Parse a Go-style duration such as `90s`, `1m`, `1h30m` or `250ms`.
/// A bare `0` is accepted as zero.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{}'", input))?;
        if number_len == 0 {
            return Err(format!("invalid duration '{}'", input));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid number in duration '{}'", input))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            unit => return Err(format!("unknown unit '{}' in duration '{}'", unit, input)),
        };
        rest = &rest[unit_len..];

        let part = Duration::try_from_secs_f64(value * seconds_per_unit)
            .map_err(|_| format!("duration '{}' is out of range", input))?;
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("duration '{}' is out of range", input))?;
    }

    Ok(total)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}
