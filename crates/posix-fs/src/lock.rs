//! Scoped advisory file locking.

use std::fs::File;

use rustix::fs::{FlockOperation, flock};

/// Exclusive advisory lock held for the guard's lifetime.
///
/// The lock is taken with blocking `flock(LOCK_EX)` on an open handle and
/// released on drop. Dropping the handle would release the lock anyway; the
/// explicit unlock keeps the release point deterministic when the guard is
/// kept alive inside larger scopes.
#[derive(Debug)]
pub struct ScopedFlock {
    file: File,
}

impl ScopedFlock {
    /// Locks `file` exclusively, blocking until the lock is granted.
    pub fn acquire(file: File) -> std::io::Result<Self> {
        flock(&file, FlockOperation::LockExclusive)?;
        Ok(Self { file })
    }
}

impl Drop for ScopedFlock {
    fn drop(&mut self) {
        let _ = flock(&self.file, FlockOperation::Unlock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    #[test]
    fn lock_can_be_reacquired_after_release() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let path = temp.path().join("lock");

        let open = || {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .expect("open lock file")
        };

        let first = ScopedFlock::acquire(open()).expect("first lock");
        drop(first);
        let _second = ScopedFlock::acquire(open()).expect("second lock");
    }
}
