//! Volume Backup Library
//!
//! Backs up Docker volumes: stops labelled containers while the archive is
//! taken, encrypts it, copies it to S3 and a local archive directory, and
//! prunes old backups.

pub mod config;
pub mod error;
pub mod managers;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, Config, ConfigError};
pub use error::{BackupError, ErrorAggregator};
pub use managers::backup::{BackupPipeline, RunOutcome};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::notification::NotificationManager;
pub use managers::stats::RunStats;
pub use utils::locker::RunLock;
