//! Stage errors for a backup run
//!
//! Every pipeline stage fails with exactly one [`BackupError`] naming the stage.
//! Stages that loop over many items (containers, prune candidates) collect the
//! individual failures with an [`ErrorAggregator`] and report the number of
//! failures together with the first underlying cause.

use crate::config::ConfigError;

/// Boxed underlying cause carried by a stage error
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("lock: {0}")]
    Lock(#[source] Cause),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("discovery: error querying containers: {0}")]
    Discovery(#[source] Cause),

    #[error("stop containers: {count} error(s) stopping containers, starting with: {source}")]
    StopContainers {
        count: usize,
        #[source]
        source: Cause,
    },

    #[error("restart containers: {count} error(s) restarting containers and services, starting with: {source}")]
    RestartContainers {
        count: usize,
        #[source]
        source: Cause,
    },

    #[error("take backup: error formatting filename template '{template}': {reason}")]
    FilenameTemplate { template: String, reason: String },

    #[error("take backup: error compressing backup folder: {0}")]
    Archive(#[source] Cause),

    #[error("encrypt backup: {0}")]
    Encryption(#[source] Cause),

    #[error("copy backup: error copying backup to {target}: {source}")]
    Distribution {
        target: String,
        #[source]
        source: Cause,
    },

    #[error("clean backup: error removing local backup file: {0}")]
    Cleanup(#[source] Cause),

    #[error("prune backups: {count} error(s) pruning old backups, starting with: {source}")]
    Prune {
        count: usize,
        #[source]
        source: Cause,
    },
}

impl BackupError {
    /// Number of underlying failures folded into this error
    pub fn failure_count(&self) -> usize {
        match self {
            BackupError::StopContainers { count, .. }
            | BackupError::RestartContainers { count, .. }
            | BackupError::Prune { count, .. } => *count,
            _ => 1,
        }
    }
}

/// Collects same-class failures across a loop and folds them into one error
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    errors: Vec<anyhow::Error>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: anyhow::Error) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = anyhow::Error>) {
        self.errors.extend(errors);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fold the collected failures; `Ok` when nothing failed
    pub fn finish<F>(self, build: F) -> Result<(), BackupError>
    where
        F: FnOnce(usize, Cause) -> BackupError,
    {
        let count = self.errors.len();
        match self.errors.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(build(count, first.into())),
        }
    }
}
