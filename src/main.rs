use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use volume_backup::config::{self, Config};
use volume_backup::managers::archive::resolve_filename;
use volume_backup::managers::logging::{init_console_logging, init_logging, LoggingConfig};
use volume_backup::utils::locker::{RunLock, DEFAULT_LOCK_FILE, DEFAULT_LOCK_TIMEOUT};
use volume_backup::BackupPipeline;

/// Env file read when `--env-file` is not given and the file exists
const DEFAULT_ENV_FILE: &str = "/etc/backup.env";

#[derive(Parser)]
#[command(name = "volume-backup")]
#[command(about = "Back up Docker volumes to S3 and a local archive", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Env file exported into the environment before reading settings
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Lock file guarding against concurrent runs
    #[arg(long, env = "BACKUP_LOCK_FILE", default_value = DEFAULT_LOCK_FILE)]
    lock_file: PathBuf,

    /// How long to wait for a running backup to finish (e.g. `30s`, `1h`)
    #[arg(
        long,
        env = "BACKUP_LOCK_TIMEOUT",
        default_value = DEFAULT_LOCK_TIMEOUT,
        value_parser = config::parse_duration
    )]
    lock_timeout: Duration,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a backup now (default)
    Run,

    /// Validate configuration and show what a run would do
    Validate,
}

fn main() -> Result<()> {
    let Cli {
        config,
        env_file,
        lock_file,
        lock_timeout,
        command,
    } = Cli::parse();

    let env_file = env_file.or_else(|| {
        let default = PathBuf::from(DEFAULT_ENV_FILE);
        default.exists().then_some(default)
    });

    match command.unwrap_or(Commands::Run) {
        Commands::Run => handle_run(
            config.as_deref(),
            env_file.as_deref(),
            &lock_file,
            lock_timeout,
        ),
        Commands::Validate => {
            init_console_logging();
            handle_validate(config.as_deref(), env_file.as_deref())
        }
    }
}

fn handle_run(
    config_path: Option<&Path>,
    env_file: Option<&Path>,
    lock_file: &Path,
    lock_timeout: Duration,
) -> Result<()> {
    // Nothing else may happen before the lock is held
    let lock = RunLock::acquire(lock_file, lock_timeout)
        .map_err(|e| volume_backup::BackupError::Lock(e.into()))?;

    let config = config::load_config(config_path, env_file).context("Failed to load configuration")?;

    // Setup logging with file rotation (must keep guard alive)
    let logging_config = LoggingConfig::from_settings(&config.logging);
    let _log_guard = init_logging(&logging_config)?;

    info!("Holding run lock {:?}, waited {:?}", lock.path(), lock.acquired_in());

    let pipeline = BackupPipeline::from_config(&config)?.with_locked_time(lock.acquired_in());
    let outcome = pipeline.run();

    println!();
    println!("{}", outcome.stats.summary());

    outcome.result?;
    println!("Finished running backup tasks.");
    Ok(())
}

fn handle_validate(config_path: Option<&Path>, env_file: Option<&Path>) -> Result<()> {
    let config = config::load_config(config_path, env_file).context("Failed to load configuration")?;
    let pipeline = BackupPipeline::from_config(&config)?;
    let example = resolve_filename(&config.backup.filename, &chrono::Local::now())?;

    println!("✓ Configuration is valid");
    println!();
    print_backup_settings(&config, &example);

    println!("Storage targets:");
    if pipeline.targets().is_empty() {
        println!("  (none, backups are not kept after the run)");
    }
    for target in pipeline.targets() {
        println!("  - {}", target.name());
    }
    println!();

    let retention = pipeline.retention();
    match retention.retention_days {
        Some(days) => {
            println!("Retention: {} day(s)", days);
            println!("  Pruning leeway: {:?}", retention.pruning_leeway);
            if retention.pruning_prefix.is_empty() {
                println!("  Pruning prefix: (all files)");
            } else {
                println!("  Pruning prefix: {}", retention.pruning_prefix);
            }
        }
        None => println!("Retention: disabled"),
    }

    Ok(())
}

fn print_backup_settings(config: &Config, example_filename: &str) {
    println!("Backup:");
    println!("  Sources:           {:?}", config.backup.sources);
    println!("  Filename template: {} (e.g. {})", config.backup.filename, example_filename);
    println!("  Working directory: {:?}", config.backup.working_directory);
    println!(
        "  Encryption:        {}",
        if config.backup.encryption_passphrase.as_deref().map_or(true, str::is_empty) {
            "disabled"
        } else {
            "enabled"
        }
    );
    if config.docker.is_enabled() {
        let label = &config.backup.stop_during_backup_label;
        println!(
            "  Stops containers labelled {}={}",
            volume_backup::utils::docker::STOP_DURING_BACKUP_LABEL,
            if label.is_empty() { "*" } else { label.as_str() }
        );
    } else {
        println!("  Container engine:  not available");
    }
    println!();
}
