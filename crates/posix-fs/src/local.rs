//! Production [`PosixFs`] implementation over the host filesystem.

use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use rustix::fs::{CWD, FileType, Mode, mknodat};

use crate::fs::PosixFs;
use crate::lock::ScopedFlock;
use crate::path::validate_component;
use crate::stat::{MODE_MASK, NodeKind, Stat};

/// The host filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFs;

fn validate_leaf(path: &Path) -> io::Result<()> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no final component: {}", path.display()),
        )
    })?;
    validate_component(name).map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
}

fn millis_to_filetime(ms: i64) -> FileTime {
    let secs = ms.div_euclid(1000);
    let nanos = (ms.rem_euclid(1000) * 1_000_000) as u32;
    FileTime::from_unix_time(secs, nanos)
}

impl PosixFs for LocalFs {
    fn stat(&self, path: &Path) -> io::Result<Stat> {
        match fs::symlink_metadata(path) {
            Ok(meta) => Ok(Stat::from_metadata(&meta)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Stat::missing()),
            Err(err) => Err(err),
        }
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }

    fn create_file(&self, path: &Path, mode: u32) -> io::Result<Box<dyn Write + Send>> {
        validate_leaf(path)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode & MODE_MASK)
            .open(path)?;
        Ok(Box::new(file))
    }

    fn create_directory(&self, path: &Path, mode: u32) -> io::Result<()> {
        validate_leaf(path)?;
        fs::DirBuilder::new().mode(mode & MODE_MASK).create(path)
    }

    fn list(&self, path: &Path) -> io::Result<Box<dyn Iterator<Item = io::Result<PathBuf>> + '_>> {
        let entries = fs::read_dir(path)?;
        Ok(Box::new(entries.map(|entry| entry.map(|e| e.path()))))
    }

    fn lock(&self, path: &Path) -> io::Result<ScopedFlock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        ScopedFlock::acquire(file)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        let meta = fs::symlink_metadata(path)?;
        if meta.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn delete_recursive(&self, path: &Path) -> io::Result<()> {
        let meta = fs::symlink_metadata(path)?;
        if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn symlink(&self, target: &OsStr, link: &Path) -> io::Result<()> {
        validate_leaf(link)?;
        std::os::unix::fs::symlink(target, link)
    }

    fn hard_link(&self, existing: &Path, new_path: &Path) -> io::Result<()> {
        validate_leaf(new_path)?;
        fs::hard_link(existing, new_path)
    }

    fn mknod(&self, path: &Path, kind: NodeKind, mode: u32, device: u64) -> io::Result<()> {
        validate_leaf(path)?;
        let file_type = match kind {
            NodeKind::BlockDevice => FileType::BlockDevice,
            NodeKind::CharacterDevice => FileType::CharacterDevice,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("mknod does not create {kind:?} nodes"),
                ));
            }
        };
        mknodat(
            CWD,
            path,
            file_type,
            Mode::from_bits_truncate(mode & MODE_MASK),
            device,
        )?;
        Ok(())
    }

    fn mkfifo(&self, path: &Path, mode: u32) -> io::Result<()> {
        validate_leaf(path)?;
        mknodat(
            CWD,
            path,
            FileType::Fifo,
            Mode::from_bits_truncate(mode & MODE_MASK),
            0,
        )?;
        Ok(())
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        // lchown so symlinks receive their recorded ownership instead of
        // their targets.
        std::os::unix::fs::lchown(path, Some(uid), Some(gid))
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & MODE_MASK))
    }

    fn utime(&self, path: &Path, atime_ms: i64, mtime_ms: i64) -> io::Result<()> {
        filetime::set_file_times(
            path,
            millis_to_filetime(atime_ms),
            millis_to_filetime(mtime_ms),
        )
    }

    fn read_link(&self, path: &Path) -> io::Result<OsString> {
        Ok(fs::read_link(path)?.into_os_string())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        validate_leaf(to)?;
        fs::rename(from, to)
    }
}
