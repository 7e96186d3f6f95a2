//! Test utilities for volume-backup
//!
//! This crate provides shared test utilities, mock implementations,
//! and helper functions for testing the volume-backup application.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{ConfigBuilder, TestContext, MockDockerOps, MemoryStorage};
//!
//! #[test]
//! fn my_test() {
//!     let ctx = TestContext::from_builder(ConfigBuilder::new().with_retention(7));
//!     let bucket = MemoryStorage::new("bucket");
//!     let outcome = ctx.pipeline(Some(MockDockerOps::new()), vec![Box::new(bucket)]).run();
//!     assert!(outcome.result.is_ok());
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::{ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use volume_backup::config::{
    BackupSettings, Config, NotificationConfig, NotifyEvent, RetentionPolicy, RetentionSettings,
    S3Settings,
};
pub use volume_backup::error::BackupError;
pub use volume_backup::managers::backup::{BackupPipeline, RunOutcome};

// Re-export mock implementations from the main crate
pub use volume_backup::utils::docker_ops::mock::{DockerCall, MockDockerOps};
pub use volume_backup::utils::docker_ops::DockerOperations;
pub use volume_backup::utils::storage::mock::MemoryStorage;
pub use volume_backup::utils::storage::{StorageBackend, StoredObject};

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
