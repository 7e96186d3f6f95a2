//! Backup artifact creation
//!
//! Resolves the time-based filename template and writes the source tree
//! into a single gzip-compressed tar archive.

use crate::error::BackupError;
use anyhow::Context;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Extension appended to encrypted artifacts
pub const ENCRYPTED_EXTENSION: &str = "enc";

/// The single backup file moving through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl BackupArtifact {
    /// Describe an existing file on disk
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let size = fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size,
        })
    }

    pub fn is_encrypted(&self) -> bool {
        self.path.extension().and_then(|e| e.to_str()) == Some(ENCRYPTED_EXTENSION)
    }

    /// Content type announced to remote storage
    pub fn content_type(&self) -> &'static str {
        if self.is_encrypted() {
            "application/octet-stream"
        } else {
            "application/tar+gzip"
        }
    }
}

/// Resolve a strftime-style template against the given time
pub fn resolve_filename<Tz>(template: &str, now: &DateTime<Tz>) -> Result<String, BackupError>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let items: Vec<Item> = StrftimeItems::new(template).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(BackupError::FilenameTemplate {
            template: template.to_string(),
            reason: "invalid format specifier".to_string(),
        });
    }

    let name = now.format_with_items(items.into_iter()).to_string();
    let name = name.trim().to_string();

    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(BackupError::FilenameTemplate {
            template: template.to_string(),
            reason: format!("'{}' is not a valid file name", name),
        });
    }

    Ok(name)
}

/// Archive `source` into `<working_dir>/<resolved template>`
pub fn build<Tz>(
    source: &Path,
    template: &str,
    working_dir: &Path,
    now: &DateTime<Tz>,
) -> Result<BackupArtifact, BackupError>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let name = resolve_filename(template, now)?;
    let path = working_dir.join(&name);

    info!("Archiving {:?} to {:?}", source, path);

    if let Err(e) = write_archive(source, &path) {
        if path.exists() {
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!("Failed to remove partial archive {:?}: {}", path, remove_err);
            }
        }
        return Err(BackupError::Archive(e.into()));
    }

    let artifact = BackupArtifact::from_path(&path)
        .context(format!("Failed to stat archive {:?}", path))
        .map_err(|e| BackupError::Archive(e.into()))?;

    info!("Created backup archive {} ({} bytes)", artifact.name, artifact.size);
    Ok(artifact)
}

fn write_archive(source: &Path, destination: &Path) -> anyhow::Result<()> {
    if !source.is_dir() {
        anyhow::bail!("Backup source {:?} is not a directory", source);
    }

    let root = source
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("backup"));

    let file = File::create(destination)
        .context(format!("Failed to create archive {:?}", destination))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder
        .append_dir_all(&root, source)
        .context(format!("Failed to add {:?} to archive", source))?;

    let encoder = builder.into_inner().context("Failed to finish tar stream")?;
    let file = encoder.finish().context("Failed to finish gzip stream")?;
    file.sync_all().context("Failed to flush archive to disk")?;
    Ok(())
}
