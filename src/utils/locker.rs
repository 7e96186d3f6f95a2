//! File-based locking to prevent concurrent backup runs

use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default location of the run lock
pub const DEFAULT_LOCK_FILE: &str = "/var/lock/volume-backup.lock";

/// How long a run waits for a previous run to release the lock
pub const DEFAULT_LOCK_TIMEOUT: &str = "60m";

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive lock held for the whole backup run.
///
/// The lock file is removed again when the lock is dropped, on success and
/// on failure alike.
pub struct RunLock {
    // Declared before `_lock` so the guard is dropped first
    guard: Option<RwLockWriteGuard<'static, File>>,
    _lock: Box<RwLock<File>>,
    lock_path: PathBuf,
    acquired_in: Duration,
}

impl RunLock {
    /// Acquire the run lock at the given path, waiting up to `timeout` for
    /// another run to release it.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> Result<Self> {
        let start = Instant::now();
        debug!("Attempting to acquire lock: {:?}", lock_path);

        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create lock directory")?;
            }
        }

        let mut announced = false;
        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(lock_path)
                .context(format!("Failed to open lock file: {:?}", lock_path))?;

            let mut lock = Box::new(RwLock::new(file));

            // SAFETY: the guard borrows the boxed RwLock, whose heap address never
            // changes while `RunLock` is alive. The guard field is declared first,
            // so it is dropped before the box it points into.
            let lock_ptr = &mut *lock as *mut RwLock<File>;
            let guard = loop {
                match unsafe { (*lock_ptr).try_write() } {
                    Ok(guard) => break guard,
                    Err(e) => {
                        if start.elapsed() >= timeout {
                            return Err(anyhow::Error::new(e).context(format!(
                                "Another backup run is in progress (lock held: {:?}, waited {:?})",
                                lock_path,
                                start.elapsed()
                            )));
                        }
                        if !announced {
                            info!("Waiting for another backup run to release {:?}", lock_path);
                            announced = true;
                        }
                        let remaining = timeout.saturating_sub(start.elapsed());
                        std::thread::sleep(RETRY_INTERVAL.min(remaining));
                    }
                }
            };

            // The previous holder unlinks the file before releasing it
            if !still_linked(&guard, lock_path) {
                debug!("Lock file {:?} was removed while waiting, retrying", lock_path);
                drop(guard);
                continue;
            }

            let guard: RwLockWriteGuard<'static, File> = unsafe { std::mem::transmute(guard) };
            let acquired_in = start.elapsed();
            info!("Acquired run lock {:?} after {:?}", lock_path, acquired_in);

            return Ok(Self {
                guard: Some(guard),
                _lock: lock,
                lock_path: lock_path.to_path_buf(),
                acquired_in,
            });
        }
    }

    /// Get the lock file path
    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Time spent waiting for the lock
    pub fn acquired_in(&self) -> Duration {
        self.acquired_in
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Unlink while still holding the lock so a waiter never keeps a stale file
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            debug!("Failed to remove lock file: {}", e);
        }
        self.guard.take();
        info!("Released run lock: {:?}", self.lock_path);
    }
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> bool {
    path.exists()
}
