//! The data-directory advisory lock (`<data_dir>/~lock`, spec §4.C/§6).
//! Held exclusively for the process lifetime; enforces single-writer-per-
//! directory across processes.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::{Error, Result};

pub const LOCK_FILE_NAME: &str = "~lock";

/// An open, exclusively-locked `~lock` file. Dropping it releases the
/// lock (and, since it's held for the process's lifetime, this only
/// happens at process exit or in tests).
pub struct DirLock {
    _file: File,
}

impl DirLock {
    /// Acquires the exclusive advisory lock on `<data_dir>/~lock`,
    /// creating the file if needed. Fails `EEXCL` if another process
    /// already holds it.
    pub fn acquire(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        // SAFETY: `file` owns a valid fd for the duration of this call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EWOULDBLOCK) => Err(Error::AlreadyLocked),
                _ => Err(err.into()),
            };
        }
        Ok(Self { _file: file })
    }
}
