//! Statistics collected while a backup run executes

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Container counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainersStats {
    pub all: usize,
    pub to_stop: usize,
    pub stopped: usize,
    pub stop_errors: usize,
    pub restart_errors: usize,
}

/// The artifact produced by the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupFileStats {
    pub name: String,
    pub full_path: PathBuf,
    pub size: u64,
}

/// Pruning outcome for one storage target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Candidates matching the pruning prefix
    pub total: usize,
    pub pruned: usize,
    pub prune_errors: usize,
    /// Whether pruning was refused because every candidate had expired
    pub refused: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub took_time: Duration,
    /// Time spent waiting for the run lock
    pub locked_time: Duration,
    pub containers: ContainersStats,
    pub backup_file: Option<BackupFileStats>,
    pub storages: BTreeMap<String, StorageStats>,
}

impl RunStats {
    pub fn start(start_time: DateTime<Local>) -> Self {
        Self {
            start_time,
            end_time: None,
            took_time: Duration::ZERO,
            locked_time: Duration::ZERO,
            containers: ContainersStats::default(),
            backup_file: None,
            storages: BTreeMap::new(),
        }
    }

    pub fn finish(&mut self, end_time: DateTime<Local>) {
        self.took_time = (end_time - self.start_time).to_std().unwrap_or_default();
        self.end_time = Some(end_time);
    }

    /// Multi-line human-readable summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Started:    {}", self.start_time.format("%Y-%m-%d %H:%M:%S")),
            format!("Took:       {}", format_duration(self.took_time)),
            format!(
                "Containers: {} running, {} to stop, {} stopped, {} stop error(s), {} restart error(s)",
                self.containers.all,
                self.containers.to_stop,
                self.containers.stopped,
                self.containers.stop_errors,
                self.containers.restart_errors
            ),
        ];

        if let Some(file) = &self.backup_file {
            lines.push(format!("Backup:     {} ({} bytes)", file.name, file.size));
        }

        for (name, storage) in &self.storages {
            let mut line = format!(
                "Storage:    {}: {} candidate(s), {} pruned, {} error(s)",
                name, storage.total, storage.pruned, storage.prune_errors
            );
            if storage.refused {
                line.push_str(", pruning refused");
            }
            lines.push(line);
        }

        lines.join("\n")
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        let minutes = seconds / 60;
        let secs = seconds % 60;
        if secs == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, secs)
        }
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_secs(3720)), "1h 2m");
    }

    #[test]
    fn test_finish_records_duration() {
        let start = Local.with_ymd_and_hms(2024, 3, 9, 14, 0, 0).unwrap();
        let mut stats = RunStats::start(start);
        stats.finish(start + chrono::Duration::seconds(90));

        assert_eq!(stats.took_time, Duration::from_secs(90));
        assert!(stats.end_time.is_some());
    }

    #[test]
    fn test_summary_mentions_storages() {
        let start = Local.with_ymd_and_hms(2024, 3, 9, 14, 0, 0).unwrap();
        let mut stats = RunStats::start(start);
        stats.backup_file = Some(BackupFileStats {
            name: "backup.tar.gz".to_string(),
            full_path: PathBuf::from("/tmp/backup.tar.gz"),
            size: 42,
        });
        stats.storages.insert(
            "local archive".to_string(),
            StorageStats {
                total: 4,
                pruned: 0,
                prune_errors: 0,
                refused: true,
            },
        );

        let summary = stats.summary();
        assert!(summary.contains("backup.tar.gz (42 bytes)"));
        assert!(summary.contains("local archive: 4 candidate(s)"));
        assert!(summary.contains("pruning refused"));
    }
}
