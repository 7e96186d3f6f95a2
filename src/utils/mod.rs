pub mod command;
pub mod docker;
pub mod locker;
pub mod s3;
pub mod storage;

// Trait-based abstractions for testability
pub mod docker_ops;

// Re-export commonly used types and traits (used by test crate)
pub use docker_ops::{DockerOperations, RealDockerOps};
pub use storage::{LocalArchive, StorageBackend, StoredObject};
