//! The unpack engine.

use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dedup::DataIndex;
use flate2::read::GzDecoder;
use posix_fs::{NodeKind, PosixFs};
use protocol::{FileMeta, RecordReader, Tag, read_stream_header};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::ArchiveError;
use crate::verbose::VerbosePrinter;

/// A directory whose recorded mtime is applied only once the stream has
/// moved past its subtree.
#[derive(Debug)]
struct DeferredMtime {
    /// The directory's pack path plus a trailing `/`; any record still
    /// inside the subtree starts with this.
    prefix: String,
    target: PathBuf,
    mtime_ms: i64,
}

#[derive(Default)]
struct UnpackState {
    /// link id -> (first materialised path, references still expected)
    links: FxHashMap<u64, (PathBuf, u64)>,
    /// subtree root (first pack-path segment) -> deferred-mtime stack
    mtimes: FxHashMap<String, Vec<DeferredMtime>>,
}

/// Streaming unpacker into an existing target directory.
///
/// Directories are materialised implicitly when their children arrive (the
/// stream is post-order) and reconciled when their own record shows up;
/// their mtimes are restored only after the stream has left the subtree,
/// and the stacks are drained on every exit path, including errors and
/// cancellation.
pub struct Unpacker<'a> {
    fs: &'a dyn PosixFs,
    force: bool,
    dry_run: bool,
    verbose: Option<&'a VerbosePrinter>,
    cancel: Option<&'a CancelToken>,
    dedup: Option<Arc<DataIndex>>,
}

impl<'a> Unpacker<'a> {
    /// Creates an unpacker over `fs` with all options off.
    pub fn new(fs: &'a dyn PosixFs) -> Self {
        Self {
            fs,
            force: false,
            dry_run: false,
            verbose: None,
            cancel: None,
            dedup: None,
        }
    }

    /// Overwrites existing target nodes instead of failing.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Consumes the stream without touching the filesystem.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Streams each unpacked archive path through `printer`.
    #[must_use]
    pub fn verbose(mut self, printer: &'a VerbosePrinter) -> Self {
        self.verbose = Some(printer);
        self
    }

    /// Observes `token` at the top of each record.
    #[must_use]
    pub fn cancel_token(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Routes regular-file payloads through a dedup index; targets become
    /// hard links into the chunk store where possible.
    #[must_use]
    pub fn dedup_index(mut self, index: Arc<DataIndex>) -> Self {
        self.dedup = Some(index);
        self
    }

    /// Unpacks `input` into `dest`, which must be an existing directory.
    pub fn unpack<R: Read>(&self, mut input: R, dest: &Path) -> Result<(), ArchiveError> {
        let stat = self.fs.stat(dest)?;
        if !stat.exists || stat.kind != NodeKind::Directory {
            return Err(ArchiveError::BadDestination(dest.to_path_buf()));
        }

        let compressed = read_stream_header(&mut input)?;
        if compressed {
            self.run(RecordReader::new(GzDecoder::new(input)), dest)
        } else {
            self.run(RecordReader::new(input), dest)
        }
    }

    fn run<R: Read>(
        &self,
        mut reader: RecordReader<R>,
        dest: &Path,
    ) -> Result<(), ArchiveError> {
        let mut state = UnpackState::default();
        let outcome = self.consume(&mut reader, dest, &mut state);
        // The stacks drain even when the stream failed mid-way, so the
        // directories that were fully written keep their recorded mtimes.
        let drained = self.drain_all(&mut state);
        outcome?;
        drained?;
        debug!("unpack stream complete");
        Ok(())
    }

    fn check_cancel(&self) -> io::Result<()> {
        match self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    fn consume<R: Read>(
        &self,
        reader: &mut RecordReader<R>,
        dest: &Path,
        state: &mut UnpackState,
    ) -> Result<(), ArchiveError> {
        loop {
            self.check_cancel()?;
            let tag = reader.read_tag()?;
            if tag == Tag::End {
                return Ok(());
            }

            let pack_path = reader.read_path()?;
            self.flush_mtimes(state, &pack_path)?;
            let target = dest.join(&pack_path[1..]);

            match tag {
                Tag::RegularFile => self.restore_regular(reader, state, dest, &target)?,
                Tag::Directory => {
                    self.restore_directory(reader, state, dest, &pack_path, &target)?;
                }
                Tag::Symlink => self.restore_symlink(reader, dest, &target)?,
                Tag::BlockDevice => {
                    self.restore_device(reader, NodeKind::BlockDevice, dest, &target)?;
                }
                Tag::CharacterDevice => {
                    self.restore_device(reader, NodeKind::CharacterDevice, dest, &target)?;
                }
                Tag::Fifo => self.restore_fifo(reader, dest, &target)?,
                Tag::End => unreachable!("handled above"),
            }

            if let Some(printer) = self.verbose {
                printer.emit(&pack_path)?;
            }
        }
    }

    // ------------------------------------------------------------------
    // Directory-mtime deferral
    // ------------------------------------------------------------------

    fn flush_mtimes(&self, state: &mut UnpackState, pack_path: &str) -> Result<(), ArchiveError> {
        let root = subtree_root(pack_path);
        let Some(stack) = state.mtimes.get_mut(root) else {
            return Ok(());
        };
        while let Some(top) = stack.last() {
            if pack_path.starts_with(&top.prefix) {
                break;
            }
            let deferred = stack.pop().expect("stack top just observed");
            self.apply_mtime(&deferred)?;
        }
        if stack.is_empty() {
            let root = root.to_owned();
            state.mtimes.remove(&root);
        }
        Ok(())
    }

    fn apply_mtime(&self, deferred: &DeferredMtime) -> Result<(), ArchiveError> {
        if self.dry_run {
            return Ok(());
        }
        let stat = self.fs.stat(&deferred.target)?;
        if stat.exists {
            self.fs
                .utime(&deferred.target, stat.atime_ms, deferred.mtime_ms)?;
        }
        Ok(())
    }

    fn drain_all(&self, state: &mut UnpackState) -> Result<(), ArchiveError> {
        let mut first_err = None;
        for (_, stack) in state.mtimes.drain() {
            for deferred in stack.iter().rev() {
                if let Err(err) = self.apply_mtime(deferred) {
                    first_err.get_or_insert(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // ------------------------------------------------------------------
    // Collision policy and implicit parents
    // ------------------------------------------------------------------

    /// Applies the force policy for a non-directory record's target.
    fn clear_target(&self, target: &Path) -> Result<(), ArchiveError> {
        let stat = self.fs.stat(target)?;
        if stat.exists {
            if !self.force {
                return Err(ArchiveError::TargetExists(target.to_path_buf()));
            }
            self.fs.delete_recursive(target)?;
        }
        Ok(())
    }

    /// Creates missing ancestors of `target` below `dest`.
    ///
    /// The stream is post-order, so children routinely arrive before their
    /// directory's own record; implicit parents get a default mode and are
    /// reconciled when the real record shows up. A non-directory standing
    /// where an ancestor belongs follows the force policy like any other
    /// collision.
    fn ensure_parents(&self, dest: &Path, target: &Path) -> Result<(), ArchiveError> {
        let Some(parent) = target.parent() else {
            return Ok(());
        };
        let mut missing = Vec::new();
        let mut cursor = parent;
        while cursor != dest {
            let stat = self.fs.stat(cursor)?;
            if stat.exists {
                if stat.kind == NodeKind::Directory {
                    break;
                }
                if !self.force {
                    return Err(ArchiveError::TargetExists(cursor.to_path_buf()));
                }
                self.fs.delete_recursive(cursor)?;
            }
            missing.push(cursor.to_path_buf());
            match cursor.parent() {
                Some(next) => cursor = next,
                None => break,
            }
        }
        for dir in missing.iter().rev() {
            self.fs.create_directory(dir, 0o755)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Per-kind restoration
    // ------------------------------------------------------------------

    fn restore_regular<R: Read>(
        &self,
        reader: &mut RecordReader<R>,
        state: &mut UnpackState,
        dest: &Path,
        target: &Path,
    ) -> Result<(), ArchiveError> {
        let link_id = reader.read_link_id()?;

        if link_id != 0 {
            if let Some((first_path, remaining)) = state.links.get_mut(&link_id) {
                // Replay: the record carried nothing but the id.
                if !self.dry_run {
                    let first_path = first_path.clone();
                    self.clear_target(target)?;
                    self.ensure_parents(dest, target)?;
                    self.fs.hard_link(&first_path, target)?;
                }
                *remaining -= 1;
                if *remaining == 0 {
                    state.links.remove(&link_id);
                }
                return Ok(());
            }

            let meta = reader.read_meta()?;
            let num_links = reader.read_num_links()?;
            self.write_regular(reader, dest, target, &meta)?;
            if num_links > 1 {
                state
                    .links
                    .insert(link_id, (target.to_path_buf(), u64::from(num_links) - 1));
            }
            return Ok(());
        }

        let meta = reader.read_meta()?;
        self.write_regular(reader, dest, target, &meta)
    }

    fn write_regular<R: Read>(
        &self,
        reader: &mut RecordReader<R>,
        dest: &Path,
        target: &Path,
        meta: &FileMeta,
    ) -> Result<(), ArchiveError> {
        if self.dry_run {
            reader.data_reader().drain()?;
            return Ok(());
        }

        self.clear_target(target)?;
        self.ensure_parents(dest, target)?;

        if let Some(index) = &self.dedup {
            let mut payload = Vec::new();
            reader.data_reader().read_to_end(&mut payload)?;
            if !payload.is_empty() {
                let stored = index.insert(&payload)?;
                if !stored.name.gz {
                    // The target shares the chunk's inode; ownership, mode,
                    // and times belong to the index, not this tree.
                    self.fs.hard_link(&stored.path, target)?;
                    return Ok(());
                }
            }
            // Zero-length files and gzip-stored chunks are written plainly.
            let mut out = self.fs.create_file(target, (meta.mode as u32) & 0o7777)?;
            out.write_all(&payload)?;
            drop(out);
        } else {
            let mut out = self.fs.create_file(target, (meta.mode as u32) & 0o7777)?;
            let mut data = reader.data_reader();
            io::copy(&mut data, &mut out)?;
            drop(out);
        }

        self.fs.chown(target, meta.uid, meta.gid)?;
        self.fs.set_mode(target, meta.mode as u32)?;
        let stat = self.fs.stat(target)?;
        self.fs.utime(target, stat.atime_ms, meta.mtime_ms)?;
        Ok(())
    }

    fn restore_directory<R: Read>(
        &self,
        reader: &mut RecordReader<R>,
        state: &mut UnpackState,
        dest: &Path,
        pack_path: &str,
        target: &Path,
    ) -> Result<(), ArchiveError> {
        let meta = reader.read_meta()?;

        if !self.dry_run {
            let stat = self.fs.stat(target)?;
            if stat.exists && stat.kind != NodeKind::Directory {
                if !self.force {
                    return Err(ArchiveError::TargetExists(target.to_path_buf()));
                }
                self.fs.delete_recursive(target)?;
            }

            let stat = self.fs.stat(target)?;
            if stat.exists {
                // Usually the directory was created implicitly for its
                // children; reconcile only the fields that differ.
                if stat.uid != meta.uid || stat.gid != meta.gid {
                    self.fs.chown(target, meta.uid, meta.gid)?;
                }
                if u64::from(stat.mode) != meta.mode {
                    self.fs.set_mode(target, meta.mode as u32)?;
                }
            } else {
                self.ensure_parents(dest, target)?;
                self.fs.create_directory(target, (meta.mode as u32) & 0o7777)?;
                self.fs.chown(target, meta.uid, meta.gid)?;
                self.fs.set_mode(target, meta.mode as u32)?;
            }
        }

        state
            .mtimes
            .entry(subtree_root(pack_path).to_owned())
            .or_default()
            .push(DeferredMtime {
                prefix: format!("{pack_path}/"),
                target: target.to_path_buf(),
                mtime_ms: meta.mtime_ms,
            });
        Ok(())
    }

    fn restore_symlink<R: Read>(
        &self,
        reader: &mut RecordReader<R>,
        dest: &Path,
        target: &Path,
    ) -> Result<(), ArchiveError> {
        let (uid, gid) = reader.read_owner()?;
        let link_target = reader.read_symlink_target()?;

        if self.dry_run {
            return Ok(());
        }
        self.clear_target(target)?;
        self.ensure_parents(dest, target)?;
        self.fs.symlink(OsStr::new(&link_target), target)?;
        // No chmod: symlink modes are not portable.
        self.fs.chown(target, uid, gid)?;
        Ok(())
    }

    fn restore_device<R: Read>(
        &self,
        reader: &mut RecordReader<R>,
        kind: NodeKind,
        dest: &Path,
        target: &Path,
    ) -> Result<(), ArchiveError> {
        let (uid, gid) = reader.read_owner()?;
        let mode = reader.read_mode()?;
        let device = reader.read_device()?;

        if self.dry_run {
            return Ok(());
        }
        self.clear_target(target)?;
        self.ensure_parents(dest, target)?;
        self.fs.mknod(target, kind, mode as u32, device)?;
        self.fs.chown(target, uid, gid)?;
        Ok(())
    }

    fn restore_fifo<R: Read>(
        &self,
        reader: &mut RecordReader<R>,
        dest: &Path,
        target: &Path,
    ) -> Result<(), ArchiveError> {
        let (uid, gid) = reader.read_owner()?;
        let mode = reader.read_mode()?;

        if self.dry_run {
            return Ok(());
        }
        self.clear_target(target)?;
        self.ensure_parents(dest, target)?;
        self.fs.mkfifo(target, mode as u32)?;
        self.fs.chown(target, uid, gid)?;
        Ok(())
    }
}

/// First pack-path segment, naming the per-subtree mtime stack.
fn subtree_root(pack_path: &str) -> &str {
    let trimmed = &pack_path[1..];
    trimmed.split('/').next().unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_root_takes_the_first_segment() {
        assert_eq!(subtree_root("/a"), "a");
        assert_eq!(subtree_root("/a/x"), "a");
        assert_eq!(subtree_root("/tree/deep/leaf"), "tree");
    }
}
