//! Copying the final artifact to every configured storage target

use super::archive::BackupArtifact;
use crate::error::BackupError;
use crate::utils::storage::StorageBackend;
use std::fs;
use tracing::info;

/// Copy the artifact to each target in order, stopping at the first failure
pub fn send(artifact: &BackupArtifact, targets: &[Box<dyn StorageBackend>]) -> Result<(), BackupError> {
    for target in targets {
        info!("Copying {} to {}", artifact.name, target.name());
        target
            .copy(artifact)
            .map_err(|e| BackupError::Distribution {
                target: target.name().to_string(),
                source: e.into(),
            })?;
    }
    Ok(())
}

/// Remove the local working copy once every target has it
pub fn clean(artifact: &BackupArtifact) -> Result<(), BackupError> {
    fs::remove_file(&artifact.path).map_err(|e| BackupError::Cleanup(e.into()))?;
    info!("Removed local working copy {:?}", artifact.path);
    Ok(())
}
