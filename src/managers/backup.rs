//! Backup pipeline - orchestrates a single backup run
//!
//! Stages run strictly in order and the first fatal error ends the run:
//! take the backup with labelled containers stopped, encrypt, copy to every
//! storage target, remove the working copy, prune old backups. Containers are
//! restarted right after the archive is written, whatever its outcome.

use crate::config::{resolve_retention, BackupSettings, Config, ConfigError, RetentionPolicy};
use crate::error::BackupError;
use crate::managers::archive::{self, BackupArtifact};
use crate::managers::containers::{ContainerLifecycleManager, PausedRun};
use crate::managers::notification::NotificationManager;
use crate::managers::stats::{BackupFileStats, RunStats};
use crate::managers::{distribution, encryption, retention};
use crate::utils::docker_ops::{DockerOperations, RealDockerOps};
use crate::utils::s3::S3Storage;
use crate::utils::storage::{LocalArchive, StorageBackend};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of a run together with everything recorded along the way
#[derive(Debug)]
pub struct RunOutcome {
    pub stats: RunStats,
    pub result: Result<(), BackupError>,
}

pub struct BackupPipeline {
    settings: BackupSettings,
    retention: RetentionPolicy,
    containers: Option<ContainerLifecycleManager>,
    targets: Vec<Box<dyn StorageBackend>>,
    notification_manager: Option<NotificationManager>,
    locked_time: Duration,
}

impl BackupPipeline {
    /// Create a pipeline from its parts; `docker: None` runs without a container engine
    pub fn new(
        settings: BackupSettings,
        retention: RetentionPolicy,
        docker: Option<Arc<dyn DockerOperations>>,
        targets: Vec<Box<dyn StorageBackend>>,
    ) -> Self {
        let containers = docker.map(|docker| {
            ContainerLifecycleManager::new(docker, &settings.stop_during_backup_label)
        });

        Self {
            settings,
            retention,
            containers,
            targets,
            notification_manager: None,
            locked_time: Duration::ZERO,
        }
    }

    /// Build the pipeline with real Docker, S3 and local archive access
    pub fn from_config(config: &Config) -> Result<Self, BackupError> {
        let retention = resolve_retention(config)?;

        let docker: Option<Arc<dyn DockerOperations>> = if config.docker.is_enabled() {
            Some(Arc::new(RealDockerOps::new(Duration::from_secs(
                config.docker.timeout_seconds,
            ))))
        } else {
            info!("No container engine available, containers will not be stopped");
            None
        };

        let mut targets: Vec<Box<dyn StorageBackend>> = Vec::new();
        if let Some(ref s3) = config.s3 {
            let storage = S3Storage::new(s3.clone()).map_err(|e| {
                BackupError::Config(ConfigError::ValidationError(format!(
                    "Failed to set up S3 client: {:#}",
                    e
                )))
            })?;
            targets.push(Box::new(storage));
        }
        if let Some(ref archive) = config.backup.archive {
            targets.push(Box::new(LocalArchive::new(archive)));
        }

        let mut pipeline = Self::new(config.backup.clone(), retention, docker, targets);
        if !config.notifications.webhook_url.is_empty() {
            pipeline.notification_manager =
                Some(NotificationManager::new(config.notifications.clone()));
        }
        Ok(pipeline)
    }

    pub fn with_notification_manager(mut self, manager: NotificationManager) -> Self {
        self.notification_manager = Some(manager);
        self
    }

    /// Record how long the run waited for the run lock
    pub fn with_locked_time(mut self, locked_time: Duration) -> Self {
        self.locked_time = locked_time;
        self
    }

    pub fn targets(&self) -> &[Box<dyn StorageBackend>] {
        &self.targets
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// Execute the full pipeline once
    pub fn run(&self) -> RunOutcome {
        let mut stats = RunStats::start(Local::now());
        stats.locked_time = self.locked_time;

        let result = self.run_stages(&mut stats);
        stats.finish(Local::now());

        match result {
            Ok(()) => {
                info!("Backup run finished in {:?}", stats.took_time);
                self.notify_success(&stats);
            }
            Err(ref e) => {
                error!("Backup run failed: {}", e);
                self.notify_failure(&e.to_string(), &stats);
            }
        }

        RunOutcome { stats, result }
    }

    fn run_stages(&self, stats: &mut RunStats) -> Result<(), BackupError> {
        let take_backup = || {
            archive::build(
                &self.settings.sources,
                &self.settings.filename,
                &self.settings.working_directory,
                &Local::now(),
            )
        };

        let paused: PausedRun<BackupArtifact> = match self.containers {
            Some(ref containers) => containers.run_with_containers_paused(take_backup),
            None => PausedRun::without_engine(take_backup),
        };
        stats.containers = paused.stats;

        let artifact = match paused.result {
            Ok(artifact) => artifact,
            Err(e) => {
                if let Err(ref compensation) = paused.compensation {
                    error!("{}", compensation);
                }
                return Err(e);
            }
        };
        println!("Successfully took backup.");

        // Later stages still run when restarting failed; the error is reported at the end
        let compensation = paused.compensation;
        match compensation {
            Ok(()) if stats.containers.stopped > 0 => {
                println!("Successfully restarted containers.")
            }
            Ok(()) => {}
            Err(ref e) => error!("{}", e),
        }

        let artifact = encryption::apply(artifact, self.settings.encryption_passphrase.as_deref())?;
        if artifact.is_encrypted() {
            println!("Successfully encrypted backup.");
        }
        stats.backup_file = Some(BackupFileStats {
            name: artifact.name.clone(),
            full_path: artifact.path.clone(),
            size: artifact.size,
        });

        if self.targets.is_empty() {
            warn!("No storage targets configured, {} is not kept anywhere", artifact.name);
        } else {
            distribution::send(&artifact, &self.targets)?;
            println!("Successfully copied backup to {} target(s).", self.targets.len());
        }

        // Runs without targets too
        distribution::clean(&artifact)?;
        println!("Successfully cleaned local backup.");

        if self.retention.retention_days.is_some() {
            retention::prune_all(&self.targets, &self.retention, &mut stats.storages)?;
            println!("Successfully pruned old backups.");
        }

        compensation
    }

    fn notify_failure(&self, error: &str, stats: &RunStats) {
        if let Some(ref manager) = self.notification_manager {
            if let Err(e) = manager.send_failure(error, stats) {
                warn!("Failed to send failure notification: {}", e);
            }
        }
    }

    fn notify_success(&self, stats: &RunStats) {
        if let Some(ref manager) = self.notification_manager {
            if let Err(e) = manager.send_success(stats) {
                warn!("Failed to send success notification: {}", e);
            }
        }
    }
}
