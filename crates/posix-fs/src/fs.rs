//! The filesystem contract consumed by the pack and dedup engines.

use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::lock::ScopedFlock;
use crate::stat::{NodeKind, Stat};

/// Narrow POSIX filesystem interface.
///
/// Implementations are injected into the engines; the engines never touch
/// `std::fs` directly. All operations are path-based and blocking. Creating
/// operations validate the leaf component against the POSIX naming rules
/// before touching the filesystem.
pub trait PosixFs: Send + Sync {
    /// Stats `path` without following a final symlink.
    ///
    /// A missing node is not an error: it reports as
    /// [`Stat::missing`](crate::Stat::missing).
    fn stat(&self, path: &Path) -> io::Result<Stat>;

    /// Opens `path` for reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Creates `path` exclusively (`O_CREAT | O_EXCL`) with `mode` and
    /// returns a write handle. Fails if the path already exists.
    fn create_file(&self, path: &Path, mode: u32) -> io::Result<Box<dyn Write + Send>>;

    /// Creates the directory `path` with `mode`. Fails if the path exists.
    fn create_directory(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Lists the children of `path` lazily.
    ///
    /// The iterator is non-restartable and holds an open directory handle
    /// until dropped.
    fn list(&self, path: &Path) -> io::Result<Box<dyn Iterator<Item = io::Result<PathBuf>> + '_>>;

    /// Takes an exclusive advisory lock on `path`, creating the file when
    /// absent. The lock is released when the returned guard drops.
    fn lock(&self, path: &Path) -> io::Result<ScopedFlock>;

    /// Deletes a single node (file, symlink, device, or empty directory).
    fn delete(&self, path: &Path) -> io::Result<()>;

    /// Deletes `path` and, for directories, everything beneath it.
    fn delete_recursive(&self, path: &Path) -> io::Result<()>;

    /// Creates a symlink at `link` pointing at `target`.
    fn symlink(&self, target: &OsStr, link: &Path) -> io::Result<()>;

    /// Creates a hard link at `new_path` sharing `existing`'s inode.
    fn hard_link(&self, existing: &Path, new_path: &Path) -> io::Result<()>;

    /// Creates a device node. `kind` must be
    /// [`NodeKind::BlockDevice`] or [`NodeKind::CharacterDevice`].
    fn mknod(&self, path: &Path, kind: NodeKind, mode: u32, device: u64) -> io::Result<()>;

    /// Creates a named pipe.
    fn mkfifo(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Changes ownership without following a final symlink.
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()>;

    /// Sets the permission/special bits.
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Sets access and modification times, millisecond epoch.
    fn utime(&self, path: &Path, atime_ms: i64, mtime_ms: i64) -> io::Result<()>;

    /// Reads a symlink's target.
    fn read_link(&self, path: &Path) -> io::Result<OsString>;

    /// Renames `from` to `to` within the same filesystem.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}
