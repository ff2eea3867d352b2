//! Cross-process mutual exclusion for environment mutation.
//!
//! The reconcile critical section is guarded by an advisory file lock on a
//! sibling of the environment directory (`<env>.lock`). The lock file is
//! only a token; its contents are meaningless. Release happens on drop, so
//! every exit path of the guarded block unlocks.
//!
//! The lock serializes writers that go through this crate. It does not
//! protect against processes that mutate the environment directly.

use crate::error::{IsoEnvError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Suffix appended to the environment path to form the lock path.
const LOCK_SUFFIX: &str = ".lock";

/// How often a timed acquisition re-polls the lock.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// RAII guard over the environment's advisory file lock.
#[derive(Debug)]
pub struct EnvLock {
    lock_file: File,
    path: PathBuf,
}

/// Lock path for an environment: a sibling named `<dir-name>.lock`.
pub fn lock_path(env_path: &Path) -> PathBuf {
    let name = env_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "env".to_string());
    match env_path.parent() {
        Some(parent) => parent.join(format!("{name}{LOCK_SUFFIX}")),
        None => PathBuf::from(format!("{name}{LOCK_SUFFIX}")),
    }
}

impl EnvLock {
    /// Acquire the lock for `env_path`, blocking until it is free.
    ///
    /// Contention blocks rather than errors; only a failure of the lock
    /// primitive itself surfaces as [`IsoEnvError::LockFailed`].
    pub fn acquire(env_path: &Path) -> Result<Self> {
        let path = lock_path(env_path);
        let file = Self::open(&path)?;
        file.lock_exclusive().map_err(|e| IsoEnvError::LockFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        tracing::debug!(lock = %path.display(), "acquired environment lock");
        Ok(Self {
            lock_file: file,
            path,
        })
    }

    /// Acquire the lock if it is free, returning `None` when held elsewhere.
    pub fn try_acquire(env_path: &Path) -> Result<Option<Self>> {
        let path = lock_path(env_path);
        let file = Self::open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                lock_file: file,
                path,
            })),
            Err(_) => Ok(None),
        }
    }

    /// Acquire the lock, giving up after `timeout`.
    ///
    /// Polling-based; intended for callers that need bounded waits on top of
    /// the otherwise-blocking guard.
    pub fn acquire_timeout(env_path: &Path, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(guard) = Self::try_acquire(env_path)? {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(IsoEnvError::LockFailed {
                    path: lock_path(env_path),
                    message: format!("timed out after {timeout:?}"),
                });
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    /// Path of the lock file this guard holds.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        Ok(file)
    }
}

impl Drop for EnvLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
        tracing::debug!(lock = %self.path.display(), "released environment lock");
    }
}
