//! Run lock preventing overlapping backup runs.
//!
//! The lock is a file created with create-new semantics in the storage
//! directory. It holds the owning PID and start time for operators, and is
//! removed when the [`RunLock`] guard is dropped. A lock file older than the
//! configured staleness bound is assumed to belong to a crashed run and is
//! replaced.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

use crate::transport::remove_if_exists;

/// Lock filename inside the storage directory.
pub const LOCK_FILENAME: &str = ".zimvault.lock";

/// Errors acquiring the run lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another run holds the lock.
    #[error("another run holds {} ({holder})", path.display())]
    Held { path: PathBuf, holder: String },

    /// The lock file could not be created or inspected.
    #[error("lock file error at {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Guard for an acquired run lock.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock in `dir`, replacing a lock older than `stale_after`.
    pub fn acquire(dir: &Path, stale_after: Duration) -> Result<Self, LockError> {
        let path = dir.join(LOCK_FILENAME);
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(|source| LockError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        for attempt in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let started = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0);
                    write!(file, "pid={}\nstarted={}\n", std::process::id(), started)
                        .map_err(io_err)?;
                    debug!(path = %path.display(), "Run lock acquired");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt == 0 => {
                    if !is_stale(&path, stale_after) {
                        return Err(LockError::Held {
                            holder: describe_holder(&path),
                            path,
                        });
                    }
                    warn!(
                        path = %path.display(),
                        holder = %describe_holder(&path),
                        "Replacing stale run lock"
                    );
                    remove_if_exists(&path).map_err(io_err)?;
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    // Another process took the lock between removal and retry
                    return Err(LockError::Held {
                        holder: describe_holder(&path),
                        path,
                    });
                }
                Err(e) => return Err(io_err(e)),
            }
        }

        Err(LockError::Held {
            holder: describe_holder(&path),
            path,
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Another run may have replaced this lock as stale
        if !owned_by_this_process(&self.path) {
            warn!(path = %self.path.display(), "Run lock was taken over, leaving it in place");
            return;
        }
        if let Err(e) = remove_if_exists(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}

fn owned_by_this_process(path: &Path) -> bool {
    let pid = std::process::id().to_string();
    fs::read_to_string(path)
        .map(|contents| {
            contents
                .lines()
                .filter_map(|line| line.strip_prefix("pid="))
                .any(|holder| holder.trim() == pid)
        })
        .unwrap_or(false)
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > stale_after)
}

fn describe_holder(path: &Path) -> String {
    fs::read_to_string(path)
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|_| "unknown holder".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn test_lock_created_and_released() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join(LOCK_FILENAME);

        {
            let lock = RunLock::acquire(temp.path(), DAY).unwrap();
            assert_eq!(lock.path(), lock_path);
            let contents = fs::read_to_string(&lock_path).unwrap();
            assert!(contents.contains(&format!("pid={}", std::process::id())));
        }

        assert!(!lock_path.exists());
    }

    #[test]
    fn test_second_lock_is_refused() {
        let temp = TempDir::new().unwrap();
        let _first = RunLock::acquire(temp.path(), DAY).unwrap();

        let err = RunLock::acquire(temp.path(), DAY).unwrap_err();
        match err {
            LockError::Held { holder, .. } => assert!(holder.contains("pid=")),
            other => panic!("Expected Held, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join(LOCK_FILENAME);
        fs::write(&lock_path, "pid=1\nstarted=0\n").unwrap();
        set_file_mtime(&lock_path, FileTime::from_unix_time(0, 0)).unwrap();

        let lock = RunLock::acquire(temp.path(), DAY).unwrap();

        let contents = fs::read_to_string(lock.path()).unwrap();
        assert!(contents.contains(&format!("pid={}", std::process::id())));
    }

    #[test]
    fn test_drop_keeps_lock_taken_over_by_another_run() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::acquire(temp.path(), DAY).unwrap();
        // A later run declared this lock stale and wrote its own
        fs::write(lock.path(), "pid=0\nstarted=1\n").unwrap();

        let lock_path = lock.path().to_path_buf();
        drop(lock);

        assert_eq!(
            fs::read_to_string(&lock_path).unwrap(),
            "pid=0\nstarted=1\n"
        );
    }

    #[test]
    fn test_lock_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("storage");
        let _lock = RunLock::acquire(&dir, DAY).unwrap();
        assert!(dir.join(LOCK_FILENAME).exists());
    }
}
