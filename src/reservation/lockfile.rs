//! Advisory lock files marking a display port as claimed on this host.
//!
//! The file carries no OS-level lock. Its existence alone tells sibling
//! searches to skip the port.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// File name prefix for display lock artifacts.
pub const LOCK_FILE_PREFIX: &str = ".display-lock-";

/// Deterministic lock path for `port` inside `lock_dir`.
#[must_use]
pub fn lock_path(lock_dir: &Path, port: u16) -> PathBuf {
    lock_dir.join(format!("{LOCK_FILE_PREFIX}{port}"))
}

/// Outcome of [`LockFile::create`].
#[derive(Debug)]
pub enum Claim {
    /// The lock file was created by this call.
    Acquired(LockFile),
    /// Another process created the file first.
    Contended,
}

/// An owned lock artifact.
///
/// Deleted by [`LockFile::release`] or, failing that, on drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    released: bool,
}

impl LockFile {
    /// Atomically create the lock file at `path`.
    ///
    /// The owning pid is written into the file to help diagnose stale locks.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error for anything other than the file
    /// already existing.
    pub fn create(path: PathBuf) -> std::io::Result<Claim> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(Claim::Contended),
            Err(err) => return Err(err),
        };

        if let Err(err) = writeln!(file, "{}", std::process::id()) {
            debug!(path = %path.display(), %err, "could not record pid in lock file");
        }

        debug!(path = %path.display(), "lock file created");
        Ok(Claim::Acquired(Self {
            path,
            released: false,
        }))
    }

    /// Location of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the lock file. Safe to call more than once.
    ///
    /// A file that is already gone counts as released. Other failures are
    /// logged and swallowed.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "lock file deleted"),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "lock file already absent");
            }
            Err(err) => warn!(path = %self.path.display(), %err, "failed to delete lock file"),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.release();
    }
}
