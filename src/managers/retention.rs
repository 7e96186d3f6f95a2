//! Age-based pruning of stored backups
//!
//! Each storage target is pruned on its own with the same policy. Pruning
//! never removes every matching backup of a target: when all candidates are
//! past the deadline the target is left alone and a warning is logged.

use crate::config::RetentionPolicy;
use crate::error::{BackupError, ErrorAggregator};
use crate::managers::stats::StorageStats;
use crate::utils::storage::{StorageBackend, StoredObject};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const REFUSAL_WARNING: &str = "Refusing to delete all backups. Check your configuration.";

/// What to do with the candidates of one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrunePlan {
    /// Nothing has expired, or there are no candidates at all
    Nothing { total: usize },
    /// Every candidate has expired; deleting would wipe the target
    Refuse { total: usize },
    /// Delete exactly these expired objects
    Delete {
        expired: Vec<StoredObject>,
        total: usize,
    },
}

impl PrunePlan {
    /// Partition candidates by `last_modified < deadline`
    pub fn for_candidates(candidates: Vec<StoredObject>, deadline: DateTime<Utc>) -> Self {
        let total = candidates.len();
        let expired: Vec<StoredObject> = candidates
            .into_iter()
            .filter(|object| object.last_modified < deadline)
            .collect();

        if expired.is_empty() {
            PrunePlan::Nothing { total }
        } else if deletes_everything(expired.len(), total) {
            PrunePlan::Refuse { total }
        } else {
            PrunePlan::Delete { expired, total }
        }
    }
}

/// A prune must leave at least one matching backup behind
pub fn deletes_everything(expired: usize, total: usize) -> bool {
    total > 0 && expired == total
}

/// Objects last modified strictly before this are prune-eligible
pub fn deadline(retention_days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    now - ChronoDuration::days(i64::from(retention_days))
}

/// Prune one target, returning its statistics and every failure
pub fn prune_target(
    target: &dyn StorageBackend,
    prefix: &str,
    deadline: DateTime<Utc>,
) -> (StorageStats, Vec<anyhow::Error>) {
    let mut stats = StorageStats::default();

    let candidates = match target.list(prefix) {
        Ok(candidates) => candidates,
        Err(e) => {
            stats.prune_errors = 1;
            return (
                stats,
                vec![e.context(format!("Failed to list backups in {}", target.name()))],
            );
        }
    };

    match PrunePlan::for_candidates(candidates, deadline) {
        PrunePlan::Nothing { total } => {
            stats.total = total;
            info!(
                "None of {} existing backups in {} were pruned",
                total,
                target.name()
            );
            (stats, vec![])
        }
        PrunePlan::Refuse { total } => {
            stats.total = total;
            stats.refused = true;
            warn!(
                "All {} backups in {} are older than {}. {}",
                total,
                target.name(),
                deadline.format("%Y-%m-%dT%H:%M:%SZ"),
                REFUSAL_WARNING
            );
            (stats, vec![])
        }
        PrunePlan::Delete { expired, total } => {
            stats.total = total;
            debug!("Removing {} expired backups from {}", expired.len(), target.name());
            let errors = target.remove(&expired);
            stats.prune_errors = errors.len();
            stats.pruned = expired.len() - errors.len();
            info!(
                "Pruned {} out of {} backups in {} as they were older than {}",
                stats.pruned,
                total,
                target.name(),
                deadline.format("%Y-%m-%dT%H:%M:%SZ")
            );
            (stats, errors)
        }
    }
}

/// Prune every target with the same policy
///
/// Does nothing when no retention period is configured. Otherwise waits for
/// the pruning leeway once, then prunes each target independently. Statistics
/// are recorded per target name even when pruning fails.
pub fn prune_all(
    targets: &[Box<dyn StorageBackend>],
    policy: &RetentionPolicy,
    storages: &mut BTreeMap<String, StorageStats>,
) -> Result<(), BackupError> {
    let Some(days) = policy.retention_days else {
        debug!("No retention period configured, skipping pruning");
        return Ok(());
    };

    if !policy.pruning_leeway.is_zero() {
        info!("Waiting {:?} before pruning old backups", policy.pruning_leeway);
        std::thread::sleep(policy.pruning_leeway);
    }

    let deadline = deadline(days, Utc::now());
    let mut errors = ErrorAggregator::new();

    for target in targets {
        let (stats, target_errors) = prune_target(target.as_ref(), &policy.pruning_prefix, deadline);
        storages.insert(target.name().to_string(), stats);
        errors.extend(target_errors);
    }

    errors.finish(|count, source| BackupError::Prune { count, source })
}
