//! Cross-process exclusion for spool mutation.
//!
//! A scheduled resend run and an operator command must not process the same
//! spool directory at once. The lock is a `.spool.lock` file created with
//! `create_new`; it records the holder's pid and acquisition time and is
//! removed when the guard drops. A lock older than the stale window is
//! assumed to belong to a crashed process and is taken over.
//!
//! Removal is compare-and-remove: the lock file is renamed to a private
//! name, its contents are checked against what the caller expects, and a
//! file that turns out to belong to someone else is linked back in place.
//! A takeover therefore never deletes a lock that a competing process has
//! just created, and a holder that was taken over never deletes the new
//! owner's lock on drop.

use crate::atomic::ensure_dir;
use crate::{SpoolError, SpoolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Lock file name inside the spool directory.
pub const LOCK_FILE_NAME: &str = ".spool.lock";

/// Age after which an existing lock is considered abandoned.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Guard holding the spool lock; released on drop.
#[derive(Debug)]
pub struct SpoolLock {
    path: PathBuf,
    /// Exact bytes written at acquisition; identifies this holder.
    contents: Vec<u8>,
}

impl SpoolLock {
    /// Acquire the lock for `spool_dir` using the default stale window.
    pub fn acquire(spool_dir: &Path) -> SpoolResult<Self> {
        Self::acquire_with_stale_after(spool_dir, DEFAULT_STALE_AFTER)
    }

    /// Acquire the lock, taking over an existing one older than `stale_after`.
    pub fn acquire_with_stale_after(spool_dir: &Path, stale_after: Duration) -> SpoolResult<Self> {
        ensure_dir(spool_dir)?;
        let path = spool_dir.join(LOCK_FILE_NAME);

        let contents = match try_create(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let observed = fs::read(&path).unwrap_or_default();
                let (holder, age) = inspect(&path, &observed);
                if age < stale_after {
                    return Err(SpoolError::Locked { path, holder });
                }
                warn!(
                    path = %path.display(),
                    holder = %holder,
                    age_secs = age.as_secs(),
                    "Taking over stale spool lock"
                );
                // Only the stale file seen above may be removed; a lock that
                // replaced it in the meantime belongs to a live process.
                if !remove_if_unchanged(&path, &observed)? {
                    return Err(locked(&path));
                }
                try_create(&path).map_err(|e| {
                    if e.kind() == ErrorKind::AlreadyExists {
                        locked(&path)
                    } else {
                        SpoolError::Io(e)
                    }
                })?
            }
            Err(err) => return Err(err.into()),
        };

        debug!(path = %path.display(), "Acquired spool lock");
        Ok(Self { path, contents })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpoolLock {
    fn drop(&mut self) {
        match remove_if_unchanged(&self.path, &self.contents) {
            Ok(true) => debug!(path = %self.path.display(), "Released spool lock"),
            Ok(false) => warn!(
                path = %self.path.display(),
                "Spool lock was taken over by another process, leaving it in place"
            ),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Failed to release spool lock")
            }
        }
    }
}

fn try_create(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let info = LockInfo {
        pid: std::process::id(),
        acquired_at: Utc::now(),
    };
    let body = serde_json::to_vec(&info).map_err(std::io::Error::other)?;
    file.write_all(&body)?;
    file.sync_all()?;
    Ok(body)
}

/// Remove the lock file only if it still holds `expected`.
///
/// The file is first renamed to a private name so no other process can
/// replace it between the check and the removal. A file with different
/// contents is hard-linked back; `hard_link` never overwrites, so a lock
/// created at `path` in the meantime is kept as well. Returns `Ok(true)`
/// when the expected file was removed or was already gone.
fn remove_if_unchanged(path: &Path, expected: &[u8]) -> std::io::Result<bool> {
    let swap = swap_path(path);
    match fs::rename(path, &swap) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    }

    let current = fs::read(&swap).unwrap_or_default();
    if current == expected {
        fs::remove_file(&swap)?;
        return Ok(true);
    }

    if let Err(e) = fs::hard_link(&swap, path) {
        if e.kind() != ErrorKind::AlreadyExists {
            let _ = fs::remove_file(&swap);
            return Err(e);
        }
    }
    fs::remove_file(&swap)?;
    Ok(false)
}

fn swap_path(path: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    path.with_file_name(format!(
        "{}.{}.{}.swap",
        LOCK_FILE_NAME,
        std::process::id(),
        nanos
    ))
}

fn locked(path: &Path) -> SpoolError {
    let observed = fs::read(path).unwrap_or_default();
    SpoolError::Locked {
        path: path.to_path_buf(),
        holder: inspect(path, &observed).0,
    }
}

/// Describe the holder recorded in `contents` and how long it has held the
/// lock at `path`.
///
/// Falls back to the file's mtime when the contents are unreadable.
fn inspect(path: &Path, contents: &[u8]) -> (String, Duration) {
    let info = serde_json::from_slice::<LockInfo>(contents).ok();

    match info {
        Some(info) => {
            let age = (Utc::now() - info.acquired_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            (format!("pid {}", info.pid), age)
        }
        None => {
            let age = fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                .unwrap_or(Duration::ZERO);
            ("unknown holder".to_string(), age)
        }
    }
}
