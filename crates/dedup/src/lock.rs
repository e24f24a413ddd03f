//! Per-hash-directory locking.
//!
//! Two layers, acquired strictly in this order: a non-reentrant in-process
//! mutex (one per touched hash prefix, lazily created), then an exclusive
//! advisory `flock` on the directory's `lock` sentinel for cross-process
//! writers. Both are released together when the guard drops, file lock
//! first.

use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

use posix_fs::{PosixFs, ScopedFlock};
use rustc_hash::FxHashMap;

use crate::name::LOCK_FILE_NAME;

/// Non-reentrant mutex for one hash prefix.
///
/// Reentrancy is a programming error in the index (every public operation
/// acquires exactly one hash lock); attempting it panics instead of
/// deadlocking silently.
#[derive(Debug, Default)]
pub(crate) struct HashDirLock {
    state: Mutex<Option<ThreadId>>,
    unlocked: Condvar,
}

impl HashDirLock {
    fn acquire(self: &Arc<Self>) -> InProcessGuard {
        let me = thread::current().id();
        let mut owner = self.state.lock().expect("hash lock poisoned");
        assert!(
            *owner != Some(me),
            "hash directory lock is not reentrant (prefix already held by this thread)"
        );
        while owner.is_some() {
            owner = self.unlocked.wait(owner).expect("hash lock poisoned");
        }
        *owner = Some(me);
        drop(owner);
        InProcessGuard {
            lock: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut owner = self.state.lock().expect("hash lock poisoned");
        *owner = None;
        drop(owner);
        self.unlocked.notify_one();
    }
}

pub(crate) struct InProcessGuard {
    lock: Arc<HashDirLock>,
}

impl Drop for InProcessGuard {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Guard holding both lock layers for one hash directory.
pub(crate) struct HashDirGuard {
    // Field order is drop order: the flock goes first, then the mutex.
    _flock: ScopedFlock,
    _in_process: InProcessGuard,
}

/// Lazily-populated table of hash-prefix locks.
///
/// Bounded by `1 << DIRECTORY_HASH_BITS` entries; only prefixes actually
/// touched allocate. Entries live for the table's lifetime.
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    locks: Mutex<FxHashMap<u16, Arc<HashDirLock>>>,
}

impl LockTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, prefix: u16) -> Arc<HashDirLock> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        Arc::clone(locks.entry(prefix).or_default())
    }

    /// Acquires both layers for `hash_dir` (which must already exist, since
    /// the sentinel file lives inside it).
    pub(crate) fn guard(
        &self,
        fs: &dyn PosixFs,
        prefix: u16,
        hash_dir: &Path,
    ) -> std::io::Result<HashDirGuard> {
        let in_process = self.lock_for(prefix).acquire();
        let flock = fs.lock(&hash_dir.join(LOCK_FILE_NAME))?;
        Ok(HashDirGuard {
            _flock: flock,
            _in_process: in_process,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posix_fs::LocalFs;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn different_prefixes_do_not_contend() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let table = LockTable::new();
        let dir_a = temp.path().join("aa00");
        let dir_b = temp.path().join("bb00");
        std::fs::create_dir(&dir_a).expect("mkdir");
        std::fs::create_dir(&dir_b).expect("mkdir");

        let _a = table.guard(&LocalFs, 0xaa00, &dir_a).expect("guard a");
        let _b = table.guard(&LocalFs, 0xbb00, &dir_b).expect("guard b");
    }

    #[test]
    fn same_prefix_serialises_across_threads() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let table = Arc::new(LockTable::new());
        let dir = temp.path().join("cc00");
        std::fs::create_dir(&dir).expect("mkdir");

        let guard = table.guard(&LocalFs, 0xcc00, &dir).expect("first guard");

        let (tx, rx) = mpsc::channel();
        let worker = {
            let table = Arc::clone(&table);
            let dir = dir.clone();
            thread::spawn(move || {
                let _guard = table.guard(&LocalFs, 0xcc00, &dir).expect("second guard");
                tx.send(()).expect("send");
            })
        };

        // The worker must be blocked while we hold the guard.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(5))
            .expect("worker acquired after release");
        worker.join().expect("join worker");
    }

    #[test]
    #[should_panic(expected = "not reentrant")]
    fn reentrancy_panics() {
        let lock = Arc::new(HashDirLock::default());
        let _first = lock.acquire();
        let _second = lock.acquire();
    }
}
