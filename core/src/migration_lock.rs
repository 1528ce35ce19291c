//! Cross-process exclusion for the migration runtime, ported from
//! `original_source/agent_mcp/db/migrations/migration_lock.py`'s
//! `MigrationLock`. The Python source used `fcntl.flock` on Unix and
//! exclusive-create on Windows; this crate uses `fs2::FileExt`, which wraps
//! the same two platform primitives behind one call.
//!
//! The lock file holds exactly `{pid}\n{unix_timestamp}\n`, matching the
//! Python source's format byte-for-byte so a lock file dropped by either
//! implementation is readable by the other.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fs2::FileExt;

use crate::error::{CoreError, Result};

/// Lock is considered abandoned if its timestamp is older than this, or if
/// the owning pid is no longer alive. Not configurable: a fixed staleness
/// window is part of the migration runtime's documented behavior, not a
/// tuning knob.
const STALE_THRESHOLD: Duration = Duration::from_secs(300);

/// Default acquisition timeout. Spec-mandated value of 120s, superseding
/// the Python source's 60s default.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(120);

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// A held advisory lock on `.migration.lock`. Dropping this releases the
/// lock and removes the file.
pub struct MigrationLock {
    file: File,
    path: PathBuf,
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn read_lock_contents(path: &Path) -> Option<(u32, f64)> {
    let contents = std::fs::read_to_string(path).ok()?;
    let mut lines = contents.lines();
    let pid: u32 = lines.next()?.trim().parse().ok()?;
    let timestamp: f64 = lines.next()?.trim().parse().ok()?;
    Some((pid, timestamp))
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    // Signal 0 performs no action but reports whether the pid exists and
    // is reachable, exactly as the Python source's `os.kill(pid, 0)` does.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    // No portable liveness check off Unix; fall back to the timestamp
    // check alone, same as treating every lock as potentially still live.
    true
}

fn is_stale(path: &Path) -> bool {
    let Some((pid, timestamp)) = read_lock_contents(path) else {
        return false;
    };
    if now_unix() - timestamp > STALE_THRESHOLD.as_secs_f64() {
        return true;
    }
    !process_is_alive(pid)
}

impl MigrationLock {
    /// Try to acquire the lock at `lock_path`, reclaiming it if it is
    /// stale, retrying once a second until `timeout` elapses.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::internal(format!("failed to create lock directory: {e}"))
            })?;
        }

        let start = std::time::Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(lock_path)
                .map_err(|e| CoreError::internal(format!("failed to open lock file: {e}")))?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    write_lock_contents(&file)?;
                    return Ok(Self {
                        file,
                        path: lock_path.to_path_buf(),
                    });
                }
                Err(e) if is_would_block(&e) => {
                    if is_stale(lock_path) {
                        let _ = std::fs::remove_file(lock_path);
                        continue;
                    }
                    if start.elapsed() > timeout {
                        return Err(CoreError::LockTimeout);
                    }
                    sleep(RETRY_INTERVAL);
                }
                Err(e) => {
                    return Err(CoreError::internal(format!(
                        "failed to acquire migration lock: {e}"
                    )))
                }
            }
        }
    }
}

fn is_would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == Some(libc_errno_would_block())
}

#[cfg(unix)]
fn libc_errno_would_block() -> i32 {
    libc::EWOULDBLOCK
}

#[cfg(not(unix))]
fn libc_errno_would_block() -> i32 {
    i32::MIN
}

fn write_lock_contents(file: &File) -> Result<()> {
    use std::io::{Seek, SeekFrom, Write};
    let mut file = file;
    file.set_len(0)
        .map_err(|e| CoreError::internal(format!("failed to truncate lock file: {e}")))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| CoreError::internal(format!("failed to seek lock file: {e}")))?;
    let contents = format!("{}\n{}\n", std::process::id(), now_unix());
    file.write_all(contents.as_bytes())
        .map_err(|e| CoreError::internal(format!("failed to write lock file: {e}")))?;
    file.flush()
        .map_err(|e| CoreError::internal(format!("failed to flush lock file: {e}")))
}

impl Drop for MigrationLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_then_drop_releases_and_removes_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".migration.lock");
        {
            let _lock = MigrationLock::acquire(&path, Duration::from_secs(1)).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn lock_contents_match_pid_and_timestamp_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".migration.lock");
        let _lock = MigrationLock::acquire(&path, Duration::from_secs(1)).unwrap();
        let (pid, timestamp) = read_lock_contents(&path).unwrap();
        assert_eq!(pid, std::process::id());
        assert!(timestamp > 0.0);
    }

    #[test]
    fn stale_lock_with_dead_pid_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".migration.lock");
        std::fs::write(&path, format!("999999999\n{}\n", now_unix())).unwrap();
        let lock = MigrationLock::acquire(&path, Duration::from_secs(2)).unwrap();
        let (pid, _) = read_lock_contents(&path).unwrap();
        assert_eq!(pid, std::process::id());
        drop(lock);
    }

    #[test]
    fn stale_lock_by_age_is_reclaimed_even_if_pid_alive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".migration.lock");
        let ancient = now_unix() - 400.0;
        std::fs::write(&path, format!("{}\n{}\n", std::process::id(), ancient)).unwrap();
        let lock = MigrationLock::acquire(&path, Duration::from_secs(2)).unwrap();
        drop(lock);
    }
}
