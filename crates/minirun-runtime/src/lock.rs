//! Advisory file locks.
//!
//! Lock files are created on demand and never deleted, so every process
//! contending for a name locks the same inode. The lock is released when
//! the [`FileLock`] is dropped or the holding process dies.

use std::fs::{File, OpenOptions};
use std::path::Path;

use minirun_common::error::{MinirunError, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

/// An exclusive `flock(2)` held on a lock file.
#[derive(Debug)]
pub struct FileLock {
    _flock: Flock<File>,
}

impl FileLock {
    /// Blocks until the exclusive lock on `path` is acquired.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be opened or locked.
    pub fn exclusive(path: &Path) -> Result<Self> {
        let mut file = open_lock_file(path)?;
        loop {
            match Flock::lock(file, FlockArg::LockExclusive) {
                Ok(flock) => {
                    tracing::trace!(path = %path.display(), "lock acquired");
                    return Ok(Self { _flock: flock });
                }
                Err((returned, Errno::EINTR)) => file = returned,
                Err((_, errno)) => return Err(lock_error(path, errno)),
            }
        }
    }

    /// Acquires the exclusive lock on `path` without blocking.
    ///
    /// Returns `Ok(None)` if another open file description holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be opened or locked.
    pub fn try_exclusive(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(Some(Self { _flock: flock })),
            Err((_, Errno::EWOULDBLOCK)) => Ok(None),
            Err((_, errno)) => Err(lock_error(path, errno)),
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| MinirunError::io(path, e))
}

fn lock_error(path: &Path, errno: Errno) -> MinirunError {
    MinirunError::io(path, std::io::Error::from_raw_os_error(errno as i32))
}
