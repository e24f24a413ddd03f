//! The index proper: insertion, link-copy selection, and renumbering.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use digest::Digest;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use md5::Md5;
use posix_fs::{NodeKind, PosixFs};
use tracing::debug;

use crate::error::IndexError;
use crate::lock::{HashDirGuard, LockTable};
use crate::name::{ChunkName, LOCK_FILE_NAME};

/// Index behaviour knobs.
///
/// Tests lower the link thresholds to exercise rollover and coalescing
/// without creating tens of thousands of hard links.
#[derive(Clone, Copy, Debug)]
pub struct IndexTuning {
    /// Filesystem block size driving the compression placement policy.
    pub block_size: u64,
    /// Hard ceiling on links per inode before a new link copy is opened.
    pub max_link_count: u64,
    /// Reference count at which a second, redundant copy is created.
    pub duplicate_link_count: u64,
    /// Total reference count below which extra copies are drained and freed.
    pub coalesce_link_count: u64,
    /// How often each chunk should be re-verified, driven by its mtime.
    pub verification_interval_ms: i64,
}

impl Default for IndexTuning {
    fn default() -> Self {
        Self {
            block_size: 4096,
            max_link_count: 60_000,
            duplicate_link_count: 100,
            coalesce_link_count: 50,
            verification_interval_ms: 7 * 24 * 60 * 60 * 1000,
        }
    }
}

/// Outcome of an insertion: the link copy the caller should hard-link from.
#[derive(Clone, Debug)]
pub struct StoredChunk {
    /// Absolute path of the chosen link copy.
    pub path: PathBuf,
    /// Its parsed name; `gz` tells the caller whether the body on disk is
    /// compressed.
    pub name: ChunkName,
}

/// A content-addressed chunk index rooted at one directory.
pub struct DataIndex {
    fs: Arc<dyn PosixFs>,
    root: PathBuf,
    tuning: IndexTuning,
    locks: LockTable,
}

/// Per-collision scan result: link copies ordered by link ordinal, with the
/// hard-link count observed for each.
pub(crate) type CollisionGroups = BTreeMap<u32, Vec<(ChunkName, u64)>>;

impl DataIndex {
    /// Opens (creating when absent) an index rooted at `root` with the
    /// default tuning.
    pub fn open(fs: Arc<dyn PosixFs>, root: PathBuf) -> Result<Self, IndexError> {
        Self::with_tuning(fs, root, IndexTuning::default())
    }

    /// Opens an index with explicit tuning.
    pub fn with_tuning(
        fs: Arc<dyn PosixFs>,
        root: PathBuf,
        tuning: IndexTuning,
    ) -> Result<Self, IndexError> {
        let stat = fs.stat(&root)?;
        if !stat.exists {
            fs.create_directory(&root, 0o755)?;
        } else if stat.kind != NodeKind::Directory {
            return Err(IndexError::RootNotADirectory(root));
        }
        Ok(Self {
            fs,
            root,
            tuning,
            locks: LockTable::new(),
        })
    }

    /// The index root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The active tuning values.
    #[must_use]
    pub fn tuning(&self) -> &IndexTuning {
        &self.tuning
    }

    pub(crate) fn fs(&self) -> &dyn PosixFs {
        &*self.fs
    }

    /// Runs one orphan-cleanup and (when `quick` is `false`) slow-path
    /// verification pass. See [`crate::cleanup`] for the procedure.
    pub fn cleanup(&self, quick: bool) -> Result<crate::CleanupStats, IndexError> {
        crate::cleanup::run(self, quick)
    }

    /// Locks one hash directory (both layers). The directory must exist.
    pub(crate) fn lock_hash_dir(&self, prefix: u16, dir: &Path) -> io::Result<HashDirGuard> {
        self.locks.guard(&*self.fs, prefix, dir)
    }

    /// Inserts `content`, returning the link copy to reference.
    ///
    /// The caller performs the hard link into its own tree; the index only
    /// guarantees the returned copy had room below the link ceiling at
    /// selection time.
    pub fn insert(&self, content: &[u8]) -> Result<StoredChunk, IndexError> {
        if content.is_empty() {
            return Err(IndexError::EmptyChunk);
        }

        let md5: [u8; 16] = Md5::digest(content).into();
        let len = content.len() as u64;
        let prefix = u16::from_be_bytes([md5[0], md5[1]]);
        let dir_name = format!("{prefix:04x}");
        let dir = self.root.join(&dir_name);

        if !self.fs.stat(&dir)?.exists {
            self.fs.create_directory(&dir, 0o755)?;
        }
        let _guard = self.lock_hash_dir(prefix, &dir)?;

        let mut groups = self.scan_groups(&dir, &dir_name, Some((md5, len)))?;
        self.repair_density(&dir, &mut groups)?;

        for copies in groups.values() {
            let (canonical, _) = &copies[0];
            let existing = self.read_chunk(&dir.join(canonical.file_name()), canonical.gz)?;
            if existing == content {
                let chosen = self.select_copy(&dir, copies.clone())?;
                return Ok(chosen);
            }
        }

        let next_collision = groups.keys().next_back().map_or(0, |c| c + 1);
        let name = self.store_chunk(&dir, md5, len, next_collision, 0, content)?;
        Ok(StoredChunk {
            path: dir.join(name.file_name()),
            name,
        })
    }

    /// Scans one hash directory into collision groups, keeping only live
    /// (non-corrupt) chunks. With `key` set, only entries for that
    /// `(md5, len)` pair are returned.
    pub(crate) fn scan_groups(
        &self,
        dir: &Path,
        dir_name: &str,
        key: Option<([u8; 16], u64)>,
    ) -> io::Result<CollisionGroups> {
        let children: Vec<PathBuf> = self.fs.list(dir)?.collect::<io::Result<_>>()?;

        let mut groups = CollisionGroups::new();
        for child in children {
            let Some(file_name) = child.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name == LOCK_FILE_NAME {
                continue;
            }
            let Some(chunk) = ChunkName::parse(dir_name, file_name) else {
                continue;
            };
            if chunk.corrupt {
                continue;
            }
            if let Some((md5, len)) = key {
                if chunk.md5 != md5 || chunk.len != len {
                    continue;
                }
            }
            let stat = self.fs.stat(&child)?;
            if !stat.exists {
                continue;
            }
            groups
                .entry(chunk.collision)
                .or_default()
                .push((chunk, stat.nlink));
        }
        for copies in groups.values_mut() {
            copies.sort_by_key(|(name, _)| name.link);
        }
        Ok(groups)
    }

    /// Repairs collision and link numbering so both form dense ranges from
    /// zero. Gaps are left behind by unclean shutdowns mid-renumber; the
    /// one-past-the-end probe here closes them on the next touch.
    pub(crate) fn repair_density(
        &self,
        dir: &Path,
        groups: &mut CollisionGroups,
    ) -> io::Result<()> {
        let mut repaired = CollisionGroups::new();
        for (expected_collision, (_, mut copies)) in (0u32..).zip(std::mem::take(groups)) {
            for (expected_link, entry) in (0u32..).zip(copies.iter_mut()) {
                let (name, _) = entry;
                if name.collision != expected_collision || name.link != expected_link {
                    let mut renamed = *name;
                    renamed.collision = expected_collision;
                    renamed.link = expected_link;
                    debug!(
                        from = %name.file_name(),
                        to = %renamed.file_name(),
                        "repairing chunk numbering"
                    );
                    self.fs
                        .rename(&dir.join(name.file_name()), &dir.join(renamed.file_name()))?;
                    *name = renamed;
                }
            }
            repaired.insert(expected_collision, copies);
        }
        *groups = repaired;
        Ok(())
    }

    /// Renames one collision's copies so link ordinals run densely from 0.
    fn renumber_links(&self, dir: &Path, copies: &mut [(ChunkName, u64)]) -> io::Result<()> {
        for (expected_link, entry) in (0u32..).zip(copies.iter_mut()) {
            let (name, _) = entry;
            if name.link != expected_link {
                let mut renamed = *name;
                renamed.link = expected_link;
                self.fs
                    .rename(&dir.join(name.file_name()), &dir.join(renamed.file_name()))?;
                *name = renamed;
            }
        }
        Ok(())
    }

    /// Picks (or creates) the link copy a new reference should attach to.
    fn select_copy(
        &self,
        dir: &Path,
        mut copies: Vec<(ChunkName, u64)>,
    ) -> io::Result<StoredChunk> {
        let total_refs: u64 = copies.iter().map(|(_, n)| n.saturating_sub(1)).sum();

        if copies.len() > 1 && total_refs <= self.tuning.coalesce_link_count {
            // Low demand: route everything back to copy 0 and free replicas
            // whose only remaining reference is the index itself.
            let mut kept = Vec::with_capacity(copies.len());
            for (name, nlink) in copies {
                if name.link > 0 && nlink == 1 {
                    debug!(chunk = %name.file_name(), "freeing drained link copy");
                    self.fs.delete(&dir.join(name.file_name()))?;
                } else {
                    kept.push((name, nlink));
                }
            }
            copies = kept;
            self.renumber_links(dir, &mut copies)?;
        }

        if copies.len() == 1 {
            let (name, nlink) = copies[0];
            let refs = nlink.saturating_sub(1);
            if nlink < self.tuning.max_link_count && refs < self.tuning.duplicate_link_count {
                return Ok(StoredChunk {
                    path: dir.join(name.file_name()),
                    name,
                });
            }
            // Popular chunk: open a second, physically independent copy and
            // start distributing references across both.
            return self.clone_copy(dir, &name, 1);
        }

        if let Some((name, _)) = copies
            .iter()
            .filter(|(_, nlink)| *nlink < self.tuning.max_link_count)
            .min_by_key(|(_, nlink)| *nlink)
        {
            return Ok(StoredChunk {
                path: dir.join(name.file_name()),
                name: *name,
            });
        }

        // Every copy is at the ceiling: open the next ordinal.
        let next = copies.iter().map(|(n, _)| n.link).max().map_or(0, |l| l + 1);
        let canonical = copies[0].0;
        self.clone_copy(dir, &canonical, next)
    }

    /// Materialises a new link copy as an independent inode carrying the
    /// same on-disk body (compressed or not) as `source`.
    fn clone_copy(&self, dir: &Path, source: &ChunkName, link: u32) -> io::Result<StoredChunk> {
        let mut body = Vec::new();
        self.fs
            .open(&dir.join(source.file_name()))?
            .read_to_end(&mut body)?;

        let name = ChunkName {
            link,
            ..*source
        };
        let mut out = self.fs.create_file(&dir.join(name.file_name()), 0o444)?;
        out.write_all(&body)?;
        drop(out);
        debug!(chunk = %name.file_name(), "created link copy");
        Ok(StoredChunk {
            path: dir.join(name.file_name()),
            name,
        })
    }

    /// Writes a brand-new chunk, applying the compression placement policy.
    fn store_chunk(
        &self,
        dir: &Path,
        md5: [u8; 16],
        len: u64,
        collision: u32,
        link: u32,
        content: &[u8],
    ) -> io::Result<ChunkName> {
        let blocks = |bytes: u64| bytes.div_ceil(self.tuning.block_size);

        let mut gz = false;
        let mut compressed = Vec::new();
        if len >= self.tuning.block_size {
            compressed = gzip_compress(content)?;
            // Compression only pays when it saves at least one block.
            gz = blocks(compressed.len() as u64) < blocks(len);
        }

        let name = ChunkName {
            md5,
            len,
            collision,
            link,
            gz,
            corrupt: false,
        };
        let body: &[u8] = if gz { &compressed } else { content };
        // Chunks are immutable once written; read-only mode keeps tree-side
        // hard links from modifying shared bytes.
        let mut out = self.fs.create_file(&dir.join(name.file_name()), 0o444)?;
        out.write_all(body)?;
        drop(out);
        debug!(chunk = %name.file_name(), len, gz, "stored new chunk");
        Ok(name)
    }

    /// Reads a chunk body, decompressing `.gz` storage.
    pub(crate) fn read_chunk(&self, path: &Path, gz: bool) -> io::Result<Vec<u8>> {
        let reader = self.fs.open(path)?;
        let mut bytes = Vec::new();
        if gz {
            GzDecoder::new(reader).read_to_end(&mut bytes)?;
        } else {
            let mut reader = reader;
            reader.read_to_end(&mut bytes)?;
        }
        Ok(bytes)
    }
}

fn gzip_compress(content: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    encoder.finish()
}
