//! Test context and harness for pipeline testing
//!
//! Provides a unified context for setting up test environments and building
//! pipelines wired to mock collaborators.

use crate::config_builder::ConfigBuilder;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use volume_backup::config::{resolve_retention, Config};
use volume_backup::managers::backup::BackupPipeline;
use volume_backup::utils::docker_ops::mock::MockDockerOps;
use volume_backup::utils::docker_ops::DockerOperations;
use volume_backup::utils::storage::StorageBackend;

/// Test context that manages test resources and provides common utilities
pub struct TestContext {
    /// Temporary directory for test files
    temp_dir: TempDir,
    /// The test configuration
    config: Config,
}

impl TestContext {
    /// Create a test context with the default builder configuration
    pub fn new() -> Self {
        Self::from_builder(ConfigBuilder::new())
    }

    /// Create a test context from a ConfigBuilder
    pub fn from_builder(builder: ConfigBuilder) -> Self {
        let (config, temp_dir) = builder.persist();
        Self { temp_dir, config }
    }

    /// Get the temporary directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn working_directory(&self) -> &Path {
        &self.config.backup.working_directory
    }

    /// Build a pipeline using the mock engine (if any) and the given targets
    pub fn pipeline(
        &self,
        docker: Option<MockDockerOps>,
        targets: Vec<Box<dyn StorageBackend>>,
    ) -> BackupPipeline {
        let retention = resolve_retention(&self.config).expect("Invalid retention settings");
        let docker = docker.map(|mock| Arc::new(mock) as Arc<dyn DockerOperations>);
        BackupPipeline::new(self.config.backup.clone(), retention, docker, targets)
    }

    /// Create a subdirectory in the temp dir
    pub fn create_subdir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&path).expect("Failed to create subdirectory");
        path
    }

    /// Create a file in the temp dir
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Read a file from the temp directory
    pub fn read_file(&self, name: &str) -> Result<String> {
        let path = self.temp_dir.path().join(name);
        Ok(std::fs::read_to_string(path)?)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension trait for assertion helpers
pub trait ResultAssertions<T> {
    /// Assert that the result is Ok and return the value
    fn assert_ok(self) -> T;

    /// Assert that the result is Err and the error message contains the given string
    fn assert_err_contains(self, needle: &str);
}

impl<T: std::fmt::Debug, E: std::fmt::Display> ResultAssertions<T> for std::result::Result<T, E> {
    fn assert_ok(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {}", e),
        }
    }

    fn assert_err_contains(self, needle: &str) {
        match self {
            Ok(v) => panic!("Expected Err containing '{}', got Ok: {:?}", needle, v),
            Err(e) => {
                let err_msg = e.to_string();
                assert!(
                    err_msg.contains(needle),
                    "Error '{}' does not contain '{}'",
                    err_msg,
                    needle
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context() {
        let ctx = TestContext::new();
        assert!(ctx.temp_dir().exists());
        assert!(ctx.working_directory().is_dir());
    }

    #[test]
    fn test_create_file() {
        let ctx = TestContext::new();
        let file = ctx.create_file("nested/test.txt", "hello world");
        assert!(file.exists());
        assert_eq!(ctx.read_file("nested/test.txt").unwrap(), "hello world");
    }

    #[test]
    fn test_pipeline_without_targets_cleans_working_directory() {
        let ctx = TestContext::new();
        let outcome = ctx.pipeline(None, vec![]).run();

        assert!(outcome.result.is_ok());
        assert_eq!(std::fs::read_dir(ctx.working_directory()).unwrap().count(), 0);
    }
}
