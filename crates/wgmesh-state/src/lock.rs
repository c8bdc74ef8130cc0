//! File lock with stale-owner detection.
//!
//! The lock file records `"<pid>:<unix-ms>"`. A contender that finds the
//! file older than [`STALE_AFTER_MS`] with a dead owner unlinks it and takes
//! over; otherwise it retries on a fixed cadence and gives up with
//! `LockTimeout`.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::error::{Result, StateError};

/// Age beyond which a lock with a dead owner is reclaimable.
pub const STALE_AFTER_MS: u64 = 5_000;

/// Sleep between acquisition attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Attempts before giving up.
pub const MAX_RETRIES: u32 = 20;

/// A held lock; releases on drop.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Acquires the lock at `path`.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` after [`MAX_RETRIES`] failed attempts, or an
    /// `Io` error for anything other than contention.
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut attempts = 0;
        loop {
            match try_create(path) {
                Ok(()) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                        released: false,
                    })
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if reclaim_if_stale(path) {
                        // Owner is gone; retry without burning an attempt.
                        continue;
                    }
                    attempts += 1;
                    if attempts >= MAX_RETRIES {
                        return Err(StateError::LockTimeout(path.to_path_buf()));
                    }
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(err) => return Err(StateError::Io(err)),
            }
        }
    }

    /// Explicitly releases the lock. Missing file is not an error.
    pub fn release(mut self) {
        self.unlink();
    }

    fn unlink(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "could not remove lock file");
            }
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        self.unlink();
    }
}

fn try_create(path: &Path) -> io::Result<()> {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let stamp = format!("{}:{}", std::process::id(), unix_ms());
    file.write_all(stamp.as_bytes())?;
    Ok(())
}

/// Unlinks the lock if it is stale and its owner is dead. Returns whether
/// the caller should retry immediately.
fn reclaim_if_stale(path: &Path) -> bool {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        // Raced with a release; the next create attempt decides.
        Err(err) if err.kind() == io::ErrorKind::NotFound => return true,
        Err(_) => return false,
    };
    let Some((pid, stamp_ms)) = parse_stamp(&contents) else {
        warn!(path = %path.display(), "unparseable lock file contents");
        return false;
    };

    let age_ms = unix_ms().saturating_sub(stamp_ms);
    if age_ms > STALE_AFTER_MS && !pid_alive(pid) {
        debug!(path = %path.display(), pid, age_ms, "reclaiming stale lock");
        let _ = std::fs::remove_file(path);
        return true;
    }
    false
}

fn parse_stamp(contents: &str) -> Option<(i32, u64)> {
    let (pid, stamp) = contents.trim().split_once(':')?;
    Some((pid.parse().ok()?, stamp.parse().ok()?))
}

fn pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // Signal 0 probes existence; EPERM still means the process is there.
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
