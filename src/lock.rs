//! Cross-process exclusion for mutating vault operations.
//!
//! The lock is an advisory lock on an empty `.lock` file at the vault root. It is held by a
//! [`VaultLock`] guard and released when the guard is dropped, whichever way the operation
//! exits.
use crate::config::LockMode;
use crate::error::{Result, VaultError};
use file_lock::{FileLock, FileOptions};
use std::path::Path;

pub struct VaultLock {
    _lock: FileLock,
}

impl VaultLock {
    pub const LOCK_FILE: &'static str = ".lock";

    pub fn acquire(root: &Path, mode: LockMode) -> Result<Self> {
        let path = root.join(Self::LOCK_FILE);
        let options = FileOptions::new().write(true).create(true);

        match FileLock::lock(&path, mode == LockMode::Wait, options) {
            Ok(lock) => {
                tracing::trace!("Acquired vault lock {}", path.display());
                Ok(Self { _lock: lock })
            }
            Err(e) if mode == LockMode::FailFast && is_contended(&e) => {
                Err(VaultError::Locked(root.to_path_buf()))
            }
            Err(e) => Err(VaultError::io(
                format!("Failed to lock {}", path.display()),
                e,
            )),
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || matches!(e.raw_os_error(), Some(libc::EACCES | libc::EAGAIN))
}
