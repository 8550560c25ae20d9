//! Exclusive per-scheme instance lock
//!
//! Decides primary vs. secondary atomically. Probing the channel and then
//! binding it leaves a window where two simultaneous launches both observe
//! "not occupied" and both become servers; a non-blocking exclusive
//! `flock` on a well-known file has no such window. The lock is held for
//! the primary's lifetime and released on drop. The file itself is never
//! unlinked: removing it while a peer still holds a descriptor would let
//! two locks coexist on different inodes.

use crate::error::IpcError;
use crate::ipc::channel::{ensure_channel_dir, scheme_is_valid};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Holds the exclusive claim to a scheme for as long as it lives.
pub struct InstanceLock {
    path: PathBuf,
    _lock: Flock<File>,
}

impl InstanceLock {
    /// Try to claim `scheme` within `dir`.
    ///
    /// `Ok(None)` means another process (or another handle in this one)
    /// already holds the claim. Anything else that keeps the lock file
    /// from being opened or locked surfaces as an error.
    pub fn try_acquire(dir: &Path, scheme: &str) -> Result<Option<Self>, IpcError> {
        if !scheme_is_valid(scheme) {
            return Err(IpcError::InvalidScheme(scheme.to_string()));
        }
        ensure_channel_dir(dir)?;

        let path = dir.join(format!("{scheme}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .mode(0o600)
            .open(&path)
            .map_err(|source| IpcError::Lock {
                path: path.clone(),
                source,
            })?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => Ok(Some(Self { path, _lock: lock })),
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => Ok(None),
            Err((_, errno)) => Err(IpcError::Lock {
                path,
                source: io::Error::from(errno),
            }),
        }
    }

    /// Path of the underlying lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_contend() {
        let dir = tempfile::tempdir().unwrap();

        let first = InstanceLock::try_acquire(dir.path(), "locktest").unwrap();
        assert!(first.is_some());

        // flock conflicts across independent descriptors, even within one
        // process.
        let second = InstanceLock::try_acquire(dir.path(), "locktest").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_release_on_drop() {
        let dir = tempfile::tempdir().unwrap();

        let first = InstanceLock::try_acquire(dir.path(), "droptest").unwrap();
        assert!(first.is_some());
        drop(first);

        let second = InstanceLock::try_acquire(dir.path(), "droptest").unwrap();
        assert!(second.is_some());
    }

    #[test]
    fn test_distinct_schemes_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();

        let a = InstanceLock::try_acquire(dir.path(), "schemea").unwrap();
        let b = InstanceLock::try_acquire(dir.path(), "schemeb").unwrap();
        assert!(a.is_some());
        assert!(b.is_some());
    }

    #[test]
    fn test_invalid_scheme_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = InstanceLock::try_acquire(dir.path(), "No Scheme").unwrap_err();
        assert!(matches!(err, IpcError::InvalidScheme(_)));
    }

    #[test]
    fn test_lock_file_survives_release() {
        let dir = tempfile::tempdir().unwrap();

        let lock = InstanceLock::try_acquire(dir.path(), "sticky").unwrap().unwrap();
        let path = lock.path().to_path_buf();
        drop(lock);

        assert!(path.exists(), "lock file must not be unlinked on release");
    }
}
