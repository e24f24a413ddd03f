//! Merge-sorted interleaving over one or more source roots.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::PathBuf;

use posix_fs::{NodeKind, PosixFs, Stat};
use thiserror::Error;

use crate::order::PackOrderKey;

/// Traversal failures.
#[derive(Debug, Error)]
pub enum WalkError {
    /// A source root does not exist.
    #[error("source root does not exist: {0}")]
    MissingRoot(PathBuf),

    /// A source root is not a directory.
    #[error("source root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A source root has no final component to name the subtree after.
    #[error("source root has no usable name: {0}")]
    UnnamedRoot(PathBuf),

    /// An entry name is not valid UTF-8 and cannot travel on the wire.
    #[error("entry name is not valid UTF-8: {0}")]
    NonUtf8Name(PathBuf),

    /// Filesystem failure during the walk.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One traversal result.
#[derive(Clone, Debug)]
pub struct WalkEntry {
    /// Index of the source root this entry came from.
    pub source: usize,
    /// Absolute on-disk path.
    pub path: PathBuf,
    /// `/`-rooted archive path (`/<root-basename>/<relative>`).
    pub pack_path: String,
    /// Metadata snapshot taken when the entry was queued.
    pub stat: Stat,
}

#[derive(Debug)]
struct Pending {
    source: usize,
    path: PathBuf,
    /// Path relative to the entry's own source root; the interleaving key.
    /// Empty for the root itself, which therefore sorts after everything
    /// beneath any root.
    rel_path: String,
    pack_path: String,
    stat: Stat,
}

/// Post-order interleaving walker.
///
/// All sources advance together: the ordered map is keyed by each entry's
/// *source-relative* path, so the globally smallest relative path across all
/// roots is produced next, with same-key entries draining in insertion
/// order. Directories are expanded the moment they are discovered — their
/// children must already be in the map for the minimum key to be the true
/// global next entry, because under the prefix-after-extension order a
/// sibling key can sort between a directory's descendants and the directory
/// itself. Every directory therefore surfaces only after all of its
/// descendants, and the map holds the complete un-emitted remainder of
/// every source.
pub struct InterleavedWalker<'a> {
    fs: &'a dyn PosixFs,
    pending: BTreeMap<PackOrderKey, VecDeque<Pending>>,
}

impl std::fmt::Debug for InterleavedWalker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterleavedWalker")
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl<'a> InterleavedWalker<'a> {
    /// Seeds the walker with `roots`, failing fast when any root is missing
    /// or not a directory. All listing and stat I/O happens here; iteration
    /// itself cannot fail.
    pub fn new(fs: &'a dyn PosixFs, roots: &[PathBuf]) -> Result<Self, WalkError> {
        let mut walker = Self {
            fs,
            pending: BTreeMap::new(),
        };

        for (source, root) in roots.iter().enumerate() {
            let stat = fs.stat(root)?;
            if !stat.exists {
                return Err(WalkError::MissingRoot(root.clone()));
            }
            if stat.kind != NodeKind::Directory {
                return Err(WalkError::NotADirectory(root.clone()));
            }
            let name = root
                .file_name()
                .ok_or_else(|| WalkError::UnnamedRoot(root.clone()))?;
            let name = name
                .to_str()
                .ok_or_else(|| WalkError::NonUtf8Name(root.clone()))?;

            walker.discover(Pending {
                source,
                path: root.clone(),
                rel_path: String::new(),
                pack_path: format!("/{name}"),
                stat,
            })?;
        }
        Ok(walker)
    }

    /// Queues one entry, first descending into it when it is a directory so
    /// every descendant participates in the global ordering before the
    /// directory itself can become the minimum.
    fn discover(&mut self, pending: Pending) -> Result<(), WalkError> {
        if pending.stat.kind == NodeKind::Directory {
            // Collected eagerly: the listing handle must not outlive this
            // call, and the ordered map provides the sorting anyway.
            let children: Vec<PathBuf> = self.fs.list(&pending.path)?.collect::<io::Result<_>>()?;
            for child in children {
                let name = child
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| WalkError::NonUtf8Name(child.clone()))?
                    .to_owned();
                let rel_path = if pending.rel_path.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{name}", pending.rel_path)
                };
                let stat = self.fs.stat(&child)?;
                self.discover(Pending {
                    source: pending.source,
                    rel_path,
                    pack_path: format!("{}/{name}", pending.pack_path),
                    path: child,
                    stat,
                })?;
            }
        }

        self.pending
            .entry(PackOrderKey::new(&pending.rel_path))
            .or_default()
            .push_back(pending);
        Ok(())
    }

    fn pop(&mut self) -> Option<Pending> {
        let mut entry = self.pending.first_entry()?;
        let pending = entry
            .get_mut()
            .pop_front()
            .expect("queues are removed when drained");
        if entry.get().is_empty() {
            entry.remove();
        }
        Some(pending)
    }
}

impl Iterator for InterleavedWalker<'_> {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let pending = self.pop()?;
        Some(WalkEntry {
            source: pending.source,
            path: pending.path,
            pack_path: pending.pack_path,
            stat: pending.stat,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posix_fs::LocalFs;
    use std::fs;

    fn pack_paths(walker: InterleavedWalker<'_>) -> Vec<String> {
        walker.map(|entry| entry.pack_path).collect()
    }

    #[test]
    fn single_tree_is_post_order() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let root = temp.path().join("a");
        fs::create_dir(&root).expect("mkdir a");
        fs::write(root.join("x"), b"hi").expect("write x");
        fs::create_dir(root.join("d")).expect("mkdir d");
        fs::write(root.join("d").join("y"), b"hi").expect("write y");

        let walker = InterleavedWalker::new(&LocalFs, &[root]).expect("walker");
        assert_eq!(pack_paths(walker), ["/a/d/y", "/a/d", "/a/x", "/a"]);
    }

    #[test]
    fn empty_directory_is_emitted() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let root = temp.path().join("only");
        fs::create_dir(&root).expect("mkdir");

        let walker = InterleavedWalker::new(&LocalFs, &[root]).expect("walker");
        assert_eq!(pack_paths(walker), ["/only"]);
    }

    #[test]
    fn multiple_roots_interleave_by_relative_path() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let one = temp.path().join("one");
        let two = temp.path().join("two");
        fs::create_dir(&one).expect("mkdir one");
        fs::create_dir(&two).expect("mkdir two");
        fs::write(one.join("bb"), b"").expect("write");
        fs::write(two.join("aa"), b"").expect("write");

        let walker = InterleavedWalker::new(&LocalFs, &[one, two]).expect("walker");
        // Relative paths interleave across sources ("aa" < "bb"); the roots
        // themselves key on the empty string and drain last in source order.
        assert_eq!(pack_paths(walker), ["/two/aa", "/one/bb", "/one", "/two"]);
    }

    #[test]
    fn interleaving_descends_into_subtrees_across_sources() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let one = temp.path().join("one");
        let two = temp.path().join("two");
        fs::create_dir(&one).expect("mkdir one");
        fs::create_dir(&two).expect("mkdir two");
        // Source one holds d/inner; source two holds a sibling key "dz"
        // that sorts between "d/inner" and "d". The walker must surface
        // one's nested file before two's sibling.
        fs::create_dir(one.join("d")).expect("mkdir d");
        fs::write(one.join("d").join("inner"), b"").expect("write inner");
        fs::write(two.join("dz"), b"").expect("write dz");

        let walker = InterleavedWalker::new(&LocalFs, &[one, two]).expect("walker");
        assert_eq!(
            pack_paths(walker),
            ["/one/d/inner", "/two/dz", "/one/d", "/one", "/two"]
        );
    }

    #[test]
    fn missing_root_fails_fast() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let err = InterleavedWalker::new(&LocalFs, &[temp.path().join("ghost")])
            .expect_err("missing root");
        assert!(matches!(err, WalkError::MissingRoot(_)));
    }

    #[test]
    fn file_root_fails_fast() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let file = temp.path().join("plain");
        fs::write(&file, b"x").expect("write");
        let err = InterleavedWalker::new(&LocalFs, &[file]).expect_err("file root");
        assert!(matches!(err, WalkError::NotADirectory(_)));
    }
}
