//! Test fixtures and sample data
//!
//! Container engines and storage targets pre-populated for the pipeline scenarios.

use chrono::{DateTime, Duration, Utc};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use volume_backup::utils::docker::STOP_DURING_BACKUP_LABEL;
use volume_backup::utils::docker_ops::mock::MockDockerOps;
use volume_backup::utils::storage::mock::MemoryStorage;

/// Label pair marking a container for stopping with the default label value
pub const STOP_LABEL: (&str, &str) = (STOP_DURING_BACKUP_LABEL, "true");

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// Three running containers, two of them marked for stopping
pub fn three_containers_two_marked() -> MockDockerOps {
    MockDockerOps::new()
        .with_container("web", &[STOP_LABEL])
        .with_container("db", &[STOP_LABEL])
        .with_container("proxy", &[])
}

/// A bucket holding `backup-<n>.tar.gz` objects with the given ages in days
pub fn bucket_with_aged_backups(name: &str, ages_in_days: &[i64]) -> MemoryStorage {
    ages_in_days
        .iter()
        .enumerate()
        .fold(MemoryStorage::new(name), |storage, (i, age)| {
            storage.with_object(&format!("backup-{}.tar.gz", i + 1), days_ago(*age))
        })
}

/// Write a file into `dir` and backdate its modification time
pub fn aged_archive(dir: &Path, name: &str, age_days: i64) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("archive {}", name)).expect("Failed to write archive");

    let modified: std::time::SystemTime = days_ago(age_days).into();
    File::options()
        .write(true)
        .open(&path)
        .and_then(|file| file.set_modified(modified))
        .expect("Failed to set modification time");
    path
}

/// Names of the regular files in `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("Failed to read directory")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Minimal valid config TOML
pub fn minimal_config_toml() -> &'static str {
    r#"
[backup]
sources = "/backup"
filename = "backup-%Y-%m-%d.tar.gz"

[retention]
days = 7
pruning_leeway = "0s"
pruning_prefix = "backup-"

[docker]
enabled = false
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bucket_with_aged_backups() {
        let bucket = bucket_with_aged_backups("bucket", &[10, 2]);
        assert_eq!(bucket.keys(), vec!["backup-1.tar.gz", "backup-2.tar.gz"]);
    }

    #[test]
    fn test_aged_archive_is_backdated() {
        let dir = TempDir::new().unwrap();
        let path = aged_archive(dir.path(), "backup-old.tar.gz", 10);

        let modified: DateTime<Utc> = fs::metadata(&path).unwrap().modified().unwrap().into();
        assert!(modified < days_ago(9));
        assert_eq!(file_names(dir.path()), vec!["backup-old.tar.gz"]);
    }
}
