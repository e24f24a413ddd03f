//! Node metadata as a plain value record.

use std::fs::Metadata;
use std::os::unix::fs::{FileTypeExt, MetadataExt};

/// Kind of a filesystem node.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeKind {
    /// Regular file.
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Block device node.
    BlockDevice,
    /// Character device node.
    CharacterDevice,
    /// Named pipe.
    Fifo,
    /// Unix domain socket.
    Socket,
}

impl NodeKind {
    /// Derives the node kind from a [`std::fs::FileType`].
    #[must_use]
    pub fn from_file_type(ty: std::fs::FileType) -> Self {
        if ty.is_dir() {
            Self::Directory
        } else if ty.is_symlink() {
            Self::Symlink
        } else if ty.is_block_device() {
            Self::BlockDevice
        } else if ty.is_char_device() {
            Self::CharacterDevice
        } else if ty.is_fifo() {
            Self::Fifo
        } else if ty.is_socket() {
            Self::Socket
        } else {
            Self::Regular
        }
    }
}

/// Permission and special bits of `st_mode` (everything below the type bits).
pub const MODE_MASK: u32 = 0o7777;

/// Snapshot of one node's metadata.
///
/// `mode` carries only the permission, setuid/setgid, and sticky bits; the
/// node type lives in `kind`. Timestamps are millisecond epoch values, the
/// resolution used on the archive wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Stat {
    /// Whether the node exists at all. When false, every other field is zeroed.
    pub exists: bool,
    /// Node kind.
    pub kind: NodeKind,
    /// Permission and special bits.
    pub mode: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Hard link count.
    pub nlink: u64,
    /// Device the node lives on.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// Access time, millisecond epoch.
    pub atime_ms: i64,
    /// Modification time, millisecond epoch.
    pub mtime_ms: i64,
    /// Device identifier for block/character nodes, zero otherwise.
    pub rdev: u64,
    /// Size in bytes.
    pub size: u64,
}

impl Stat {
    /// The record for a path with no node behind it.
    #[must_use]
    pub const fn missing() -> Self {
        Self {
            exists: false,
            kind: NodeKind::Regular,
            mode: 0,
            uid: 0,
            gid: 0,
            nlink: 0,
            dev: 0,
            ino: 0,
            atime_ms: 0,
            mtime_ms: 0,
            rdev: 0,
            size: 0,
        }
    }

    /// Builds a [`Stat`] from `std::fs` metadata (as returned by
    /// `symlink_metadata`, so symlinks describe themselves).
    #[must_use]
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            exists: true,
            kind: NodeKind::from_file_type(meta.file_type()),
            mode: meta.mode() & MODE_MASK,
            uid: meta.uid(),
            gid: meta.gid(),
            nlink: meta.nlink(),
            dev: meta.dev(),
            ino: meta.ino(),
            atime_ms: meta.atime() * 1000 + meta.atime_nsec() / 1_000_000,
            mtime_ms: meta.mtime() * 1000 + meta.mtime_nsec() / 1_000_000,
            rdev: meta.rdev(),
            size: meta.size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_stat_is_inert() {
        let stat = Stat::missing();
        assert!(!stat.exists);
        assert_eq!(stat.nlink, 0);
        assert_eq!(stat.mtime_ms, 0);
    }

    #[test]
    fn regular_file_metadata_round_trips() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let path = temp.path().join("plain");
        fs::write(&path, b"abc").expect("write file");

        let meta = fs::symlink_metadata(&path).expect("stat file");
        let stat = Stat::from_metadata(&meta);
        assert!(stat.exists);
        assert_eq!(stat.kind, NodeKind::Regular);
        assert_eq!(stat.size, 3);
        assert_eq!(stat.nlink, 1);
        assert!(stat.mtime_ms > 0);
    }

    #[test]
    fn symlink_metadata_describes_the_link() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let target = temp.path().join("target");
        let link = temp.path().join("link");
        fs::write(&target, b"x").expect("write target");
        std::os::unix::fs::symlink(&target, &link).expect("create symlink");

        let meta = fs::symlink_metadata(&link).expect("stat link");
        assert_eq!(Stat::from_metadata(&meta).kind, NodeKind::Symlink);
    }
}
