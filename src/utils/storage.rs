//! Storage targets receiving backup copies
//!
//! Every target gets its own copy of the final artifact and is pruned on
//! its own. The local archive directory lives here; the remote bucket is
//! implemented in [`super::s3`].

use crate::managers::archive::BackupArtifact;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A stored backup as listed by a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object key or file name, relative to the target
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// A destination for backup copies that can also be pruned
pub trait StorageBackend: Send + Sync {
    /// Short human-readable name used in logs and errors
    fn name(&self) -> &str;

    /// Copy the artifact to the target, byte for byte
    fn copy(&self, artifact: &BackupArtifact) -> Result<()>;

    /// List stored backups whose key starts with `prefix`
    fn list(&self, prefix: &str) -> Result<Vec<StoredObject>>;

    /// Remove the given objects, returning one error per failed removal
    fn remove(&self, objects: &[StoredObject]) -> Vec<anyhow::Error>;
}

/// Local archive directory
#[derive(Debug, Clone)]
pub struct LocalArchive {
    directory: PathBuf,
}

impl LocalArchive {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl StorageBackend for LocalArchive {
    fn name(&self) -> &str {
        "local archive"
    }

    fn copy(&self, artifact: &BackupArtifact) -> Result<()> {
        if !self.directory.exists() {
            warn!(
                "Archive directory {:?} does not exist, skipping local copy",
                self.directory
            );
            return Ok(());
        }

        let destination = self.directory.join(&artifact.name);
        fs::copy(&artifact.path, &destination).context(format!(
            "Failed to copy {:?} to {:?}",
            artifact.path, destination
        ))?;

        info!("Copied backup to local archive: {:?}", destination);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        if !self.directory.exists() {
            return Ok(vec![]);
        }

        let mut objects = Vec::new();
        for entry in fs::read_dir(&self.directory)
            .context(format!("Failed to read archive directory {:?}", self.directory))?
        {
            let entry = entry?;
            let key = entry.file_name().to_string_lossy().to_string();
            if !key.starts_with(prefix) {
                continue;
            }

            let metadata = entry
                .metadata()
                .context(format!("Failed to stat file {:?}", entry.path()))?;
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata
                .modified()
                .context(format!("Failed to read modification time of {:?}", entry.path()))?;
            objects.push(StoredObject {
                key,
                last_modified: DateTime::<Utc>::from(modified),
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn remove(&self, objects: &[StoredObject]) -> Vec<anyhow::Error> {
        let mut errors = Vec::new();
        for object in objects {
            let path = self.directory.join(&object.key);
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed {:?}", path),
                Err(e) => errors.push(
                    anyhow::Error::new(e).context(format!("Failed to remove {:?}", path)),
                ),
            }
        }
        errors
    }
}

/// Mock implementation for testing
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::{Arc, Mutex};

    /// A stored object with its content
    #[derive(Clone, Debug)]
    pub struct MemoryObject {
        pub last_modified: DateTime<Utc>,
        pub content: Vec<u8>,
    }

    /// In-memory bucket
    #[derive(Clone)]
    pub struct MemoryStorage {
        name: String,
        pub objects: Arc<Mutex<BTreeMap<String, MemoryObject>>>,
        pub should_fail_copy: Arc<Mutex<bool>>,
        pub should_fail_list: Arc<Mutex<bool>>,
        pub failing_removes: Arc<Mutex<HashSet<String>>>,
        /// Keys passed to `remove`, in call order
        pub removed: Arc<Mutex<Vec<String>>>,
    }

    impl MemoryStorage {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                objects: Arc::default(),
                should_fail_copy: Arc::default(),
                should_fail_list: Arc::default(),
                failing_removes: Arc::default(),
                removed: Arc::default(),
            }
        }

        /// Pre-populate an object with the given modification time
        pub fn with_object(self, key: &str, last_modified: DateTime<Utc>) -> Self {
            self.objects.lock().unwrap().insert(
                key.to_string(),
                MemoryObject {
                    last_modified,
                    content: Vec::new(),
                },
            );
            self
        }

        pub fn with_failing_copy(self) -> Self {
            *self.should_fail_copy.lock().unwrap() = true;
            self
        }

        pub fn with_failing_list(self) -> Self {
            *self.should_fail_list.lock().unwrap() = true;
            self
        }

        pub fn with_failing_remove(self, key: &str) -> Self {
            self.failing_removes.lock().unwrap().insert(key.to_string());
            self
        }

        /// Keys currently stored, sorted
        pub fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }

        pub fn content(&self, key: &str) -> Option<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .map(|o| o.content.clone())
        }

        pub fn removed_keys(&self) -> Vec<String> {
            self.removed.lock().unwrap().clone()
        }
    }

    impl StorageBackend for MemoryStorage {
        fn name(&self) -> &str {
            &self.name
        }

        fn copy(&self, artifact: &BackupArtifact) -> Result<()> {
            if *self.should_fail_copy.lock().unwrap() {
                anyhow::bail!("Mock copy failure for {}", artifact.name);
            }
            let content = fs::read(&artifact.path)
                .context(format!("Failed to read {:?}", artifact.path))?;
            self.objects.lock().unwrap().insert(
                artifact.name.clone(),
                MemoryObject {
                    last_modified: Utc::now(),
                    content,
                },
            );
            Ok(())
        }

        fn list(&self, prefix: &str) -> Result<Vec<StoredObject>> {
            if *self.should_fail_list.lock().unwrap() {
                anyhow::bail!("Mock list failure");
            }
            Ok(self
                .objects
                .lock()
                .unwrap()
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, object)| StoredObject {
                    key: key.clone(),
                    last_modified: object.last_modified,
                })
                .collect())
        }

        fn remove(&self, objects: &[StoredObject]) -> Vec<anyhow::Error> {
            let mut errors = Vec::new();
            for object in objects {
                self.removed.lock().unwrap().push(object.key.clone());
                if self.failing_removes.lock().unwrap().contains(&object.key) {
                    errors.push(anyhow::anyhow!("Mock remove failure for {}", object.key));
                    continue;
                }
                self.objects.lock().unwrap().remove(&object.key);
            }
            errors
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn artifact_in(dir: &Path, name: &str, content: &[u8]) -> BackupArtifact {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        BackupArtifact::from_path(&path).unwrap()
    }

    #[test]
    fn test_local_copy() {
        let work = TempDir::new().unwrap();
        let archive_dir = TempDir::new().unwrap();
        let artifact = artifact_in(work.path(), "backup-1.tar.gz", b"archive bytes");

        let target = LocalArchive::new(archive_dir.path());
        target.copy(&artifact).unwrap();

        let copied = fs::read(archive_dir.path().join("backup-1.tar.gz")).unwrap();
        assert_eq!(copied, b"archive bytes");
        // The working copy stays in place for the next target
        assert!(artifact.path.exists());
    }

    #[test]
    fn test_local_copy_skips_missing_directory() {
        let work = TempDir::new().unwrap();
        let artifact = artifact_in(work.path(), "backup-1.tar.gz", b"x");

        let target = LocalArchive::new(work.path().join("missing"));
        assert!(target.copy(&artifact).is_ok());
    }

    #[test]
    fn test_local_list_filters_prefix_and_reads_mtime() {
        let archive_dir = TempDir::new().unwrap();
        fs::write(archive_dir.path().join("backup-a.tar.gz"), b"a").unwrap();
        fs::write(archive_dir.path().join("backup-b.tar.gz"), b"b").unwrap();
        fs::write(archive_dir.path().join("other.txt"), b"c").unwrap();
        fs::create_dir(archive_dir.path().join("backup-dir")).unwrap();

        let old = SystemTime::now() - Duration::from_secs(10 * 86400);
        let file = fs::File::options()
            .write(true)
            .open(archive_dir.path().join("backup-a.tar.gz"))
            .unwrap();
        file.set_modified(old).unwrap();

        let target = LocalArchive::new(archive_dir.path());
        let objects = target.list("backup-").unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].key, "backup-a.tar.gz");
        assert!(objects[0].last_modified < objects[1].last_modified);
    }

    #[test]
    fn test_local_list_missing_directory_is_empty() {
        let target = LocalArchive::new("/nonexistent/volume-backup-archive");
        assert!(target.list("").unwrap().is_empty());
    }

    #[test]
    fn test_local_remove_reports_each_failure() {
        let archive_dir = TempDir::new().unwrap();
        fs::write(archive_dir.path().join("backup-a.tar.gz"), b"a").unwrap();

        let target = LocalArchive::new(archive_dir.path());
        let objects = vec![
            StoredObject {
                key: "backup-a.tar.gz".to_string(),
                last_modified: Utc::now(),
            },
            StoredObject {
                key: "backup-missing.tar.gz".to_string(),
                last_modified: Utc::now(),
            },
        ];

        let errors = target.remove(&objects);
        assert_eq!(errors.len(), 1);
        assert!(!archive_dir.path().join("backup-a.tar.gz").exists());
    }
}
