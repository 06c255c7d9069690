use anyhow::Result;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::DEFAULT_STALE_TIMEOUT;

/// Best-effort, filesystem-only mutual exclusion with time-based stale-lock
/// recovery.
///
/// Acquisition is an exclusive create, which is atomic at the filesystem
/// level. Stale-lock removal is not atomic with the subsequent create, so two
/// processes that both observe a stale lock can race and one may delete the
/// other's fresh lock file. Callers must not treat acquisition as a hard
/// guarantee: they re-validate the protected invariant after acquiring (the
/// orchestrator re-probes the deployment status under the lock).
///
/// Kernel advisory locks (flock) are deliberately not used here; they are
/// unreliable on some network-mounted filesystems.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    stale_timeout: Duration,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stale_timeout: DEFAULT_STALE_TIMEOUT,
        }
    }

    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if another
    /// process holds it. Contention is a normal outcome, not an error.
    pub fn try_acquire(&self) -> Result<bool> {
        if self.is_stale() {
            log::debug!("detected a stale lock file, removing it: {}", self.path.display());

            // Not atomic with the create below: another process that also saw
            // the lock as stale may remove a lock file we are about to create.
            if let Err(err) = fs::remove_file(&self.path) {
                if err.kind() != ErrorKind::NotFound {
                    log::warn!(
                        "failed to remove the stale lock file {}: {err}",
                        self.path.display()
                    );
                }
            }
        }

        // Exclusive create; the file's mtime doubles as the staleness clock.
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        match options.open(&self.path) {
            Ok(_file) => {
                // Closed immediately, only existence and mtime matter.
                log::debug!("lock acquired: {}", self.path.display());
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                log::info!(
                    "lock not acquired, lock file already exists: {}",
                    self.path.display()
                );
                Ok(false)
            }
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("failed to acquire the lock {}", self.path.display()))),
        }
    }

    /// Removes the lock file. Releasing an already-released lock is fine.
    pub fn release(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::debug!("lock released: {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("failed to release the lock {}", self.path.display()))),
        }
    }

    /// A lock file older than the stale timeout is presumed abandoned by a
    /// crashed holder. A lock file that exists but cannot be inspected is
    /// treated as stale so a corrupt lock state can be recovered from.
    fn is_stale(&self) -> bool {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return false,
            Err(err) => {
                log::warn!(
                    "lock file {} exists but cannot be inspected, considering it stale: {err}",
                    self.path.display()
                );
                return true;
            }
        };

        let modified = match meta.modified() {
            Ok(modified) => modified,
            Err(err) => {
                log::warn!(
                    "cannot read the modification time of the lock file {}, considering it stale: {err}",
                    self.path.display()
                );
                return true;
            }
        };

        match modified.elapsed() {
            Ok(age) if age > self.stale_timeout => {
                log::debug!(
                    "lock file is stale, age {age:?} exceeds the timeout {:?}",
                    self.stale_timeout
                );
                true
            }
            // A modification time in the future means someone else just
            // created it (or clocks are skewed); either way it is fresh.
            _ => false,
        }
    }
}

/// Releases the lock when dropped, so every return path of the critical
/// section gives the lock back.
pub struct Guard<'a> {
    lock: &'a FileLock,
}

impl<'a> Guard<'a> {
    pub fn new(lock: &'a FileLock) -> Self {
        Self { lock }
    }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.release() {
            log::error!("failed to release the lock file: {err:#}");
        }
    }
}
