//! Orphan cleanup and the slow-path verifier.
//!
//! The pass walks every hash directory file by file, taking and releasing
//! the hash lock around each one and yielding the scheduler in between so
//! foreground inserts are never starved. Scheduling the pass is the
//! caller's business; the index only defines the procedure.

use std::io;
use std::path::Path;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use posix_fs::NodeKind;
use tracing::{debug, warn};

use crate::error::IndexError;
use crate::index::DataIndex;
use crate::name::{ChunkName, LOCK_FILE_NAME};

/// Counters reported by one cleanup pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CleanupStats {
    /// Chunk files visited (the `lock` sentinel is not counted).
    pub files_scanned: u64,
    /// Orphans (`nlink == 1`) deleted.
    pub orphans_deleted: u64,
    /// Chunks re-read and re-hashed by the verifier.
    pub chunks_verified: u64,
    /// Verifier mismatches renamed `.corrupt`.
    pub corrupt_found: u64,
    /// Corrupt chunks left without a sibling copy to migrate to.
    pub corrupt_without_sibling: u64,
    /// Emptied hash directories removed.
    pub dirs_removed: u64,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn parse_prefix(dir_name: &str) -> Option<u16> {
    if dir_name.len() != 4 {
        return None;
    }
    u16::from_str_radix(dir_name, 16)
        .ok()
        .filter(|_| dir_name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')))
}

pub(crate) fn run(index: &DataIndex, quick: bool) -> Result<CleanupStats, IndexError> {
    let mut stats = CleanupStats::default();

    let hash_dirs: Vec<_> = index.fs().list(index.root())?.collect::<io::Result<_>>()?;
    for dir in hash_dirs {
        let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            continue;
        };
        let Some(prefix) = parse_prefix(&dir_name) else {
            debug!(entry = %dir.display(), "skipping non-hash entry in index root");
            continue;
        };
        clean_hash_dir(index, &dir, &dir_name, prefix, quick, &mut stats)?;
    }
    Ok(stats)
}

fn clean_hash_dir(
    index: &DataIndex,
    dir: &Path,
    dir_name: &str,
    prefix: u16,
    quick: bool,
    stats: &mut CleanupStats,
) -> Result<(), IndexError> {
    // Names are snapshotted up front: the listing handle must not be held
    // across lock acquisitions, and files may vanish while we work.
    let names: Vec<String> = index
        .fs()
        .list(dir)?
        .collect::<io::Result<Vec<_>>>()?
        .into_iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_owned))
        .collect();

    for name in &names {
        if name == LOCK_FILE_NAME {
            continue;
        }
        stats.files_scanned += 1;

        {
            let _guard = index.lock_hash_dir(prefix, dir)?;
            let path = dir.join(name);
            let stat = index.fs().stat(&path)?;
            if !stat.exists {
                continue; // raced with a concurrent writer; nothing to do
            }

            if stat.kind == NodeKind::Regular && stat.nlink == 1 {
                warn!(chunk = %path.display(), "removing orphaned chunk");
                index.fs().delete(&path)?;
                stats.orphans_deleted += 1;
                if let Some(chunk) = ChunkName::parse(dir_name, name) {
                    let mut groups =
                        index.scan_groups(dir, dir_name, Some((chunk.md5, chunk.len)))?;
                    index.repair_density(dir, &mut groups)?;
                }
                continue;
            }

            if !quick {
                verify_chunk(index, dir, dir_name, name, stat.mtime_ms, stat.atime_ms, stats)?;
            }
        }

        // Lock released between files so foreground traffic interleaves.
        thread::yield_now();
    }

    remove_if_empty(index, dir, prefix, stats)?;
    Ok(())
}

/// Re-reads one chunk when its mtime says it is due, checks MD5 and length
/// against the name, and quarantines mismatches with a `.corrupt` rename.
fn verify_chunk(
    index: &DataIndex,
    dir: &Path,
    dir_name: &str,
    name: &str,
    mtime_ms: i64,
    atime_ms: i64,
    stats: &mut CleanupStats,
) -> Result<(), IndexError> {
    let Some(chunk) = ChunkName::parse(dir_name, name) else {
        return Ok(());
    };
    if chunk.corrupt {
        return Ok(());
    }
    if now_ms() - mtime_ms < index.tuning().verification_interval_ms {
        return Ok(());
    }

    let path = dir.join(name);
    let body = index.read_chunk(&path, chunk.gz)?;
    let digest: [u8; 16] = {
        use digest::Digest as _;
        md5::Md5::digest(&body).into()
    };
    stats.chunks_verified += 1;

    if digest == chunk.md5 && body.len() as u64 == chunk.len {
        // Clean: refresh the mtime so the chunk comes due again one
        // interval from now.
        index.fs().utime(&path, atime_ms, now_ms())?;
        return Ok(());
    }

    let quarantined = ChunkName {
        corrupt: true,
        ..chunk
    };
    warn!(chunk = %path.display(), "chunk failed verification, marking corrupt");
    index.fs().rename(&path, &dir.join(quarantined.file_name()))?;
    stats.corrupt_found += 1;

    let siblings = index.scan_groups(dir, dir_name, Some((chunk.md5, chunk.len)))?;
    if siblings
        .get(&chunk.collision)
        .is_none_or(|copies| copies.is_empty())
    {
        warn!(
            chunk = %path.display(),
            "corrupt chunk has no sibling copy; existing references cannot migrate"
        );
        stats.corrupt_without_sibling += 1;
    }
    Ok(())
}

fn remove_if_empty(
    index: &DataIndex,
    dir: &Path,
    prefix: u16,
    stats: &mut CleanupStats,
) -> Result<(), IndexError> {
    let survivors: Vec<String> = index
        .fs()
        .list(dir)?
        .collect::<io::Result<Vec<_>>>()?
        .into_iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_owned))
        .collect();

    if survivors.is_empty() {
        index.fs().delete(dir)?;
        stats.dirs_removed += 1;
        return Ok(());
    }

    if survivors.iter().all(|n| n == LOCK_FILE_NAME) {
        {
            let _guard = index.lock_hash_dir(prefix, dir)?;
            index.fs().delete(&dir.join(LOCK_FILE_NAME))?;
        }
        // A concurrent insert can recreate the directory immediately after;
        // that race is accepted and harmless.
        index.fs().delete(dir)?;
        stats.dirs_removed += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexTuning;
    use posix_fs::{LocalFs, PosixFs};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn test_index(root: PathBuf) -> DataIndex {
        DataIndex::open(Arc::new(LocalFs), root).expect("open index")
    }

    #[test]
    fn orphans_are_deleted_and_the_dir_removed() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let index = test_index(temp.path().join("index"));

        let stored = index.insert(b"orphaned bytes").expect("insert");
        let hash_dir = stored.path.parent().expect("hash dir").to_path_buf();
        // No consumer tree ever linked the chunk: nlink stays 1.

        let stats = index.cleanup(true).expect("cleanup");
        assert_eq!(stats.orphans_deleted, 1);
        assert_eq!(stats.dirs_removed, 1);
        assert!(!stored.path.exists());
        assert!(!hash_dir.exists());
    }

    #[test]
    fn referenced_chunks_survive_cleanup() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let index = test_index(temp.path().join("index"));
        let tree = temp.path().join("tree");
        fs::create_dir(&tree).expect("mkdir tree");

        let stored = index.insert(b"still referenced").expect("insert");
        fs::hard_link(&stored.path, tree.join("file")).expect("link");

        let stats = index.cleanup(true).expect("cleanup");
        assert_eq!(stats.orphans_deleted, 0);
        assert!(stored.path.exists());
    }

    #[test]
    fn orphan_deletion_renumbers_survivors() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let index = test_index(temp.path().join("index"));
        let tree = temp.path().join("tree");
        fs::create_dir(&tree).expect("mkdir tree");

        let content = b"renumber on orphan";
        let stored = index.insert(content).expect("insert");
        let dir = stored.path.parent().expect("hash dir").to_path_buf();

        // Fabricate a referenced copy at link 1, then orphan copy 0.
        let mut copy1 = stored.name;
        copy1.link = 1;
        fs::copy(&stored.path, dir.join(copy1.file_name())).expect("copy");
        fs::hard_link(dir.join(copy1.file_name()), tree.join("ref")).expect("link");

        let stats = index.cleanup(true).expect("cleanup");
        assert_eq!(stats.orphans_deleted, 1);
        // The surviving copy slid down into the freed ordinal.
        assert!(dir.join(stored.name.file_name()).exists());
        assert!(!dir.join(copy1.file_name()).exists());
    }

    #[test]
    fn stale_corrupt_chunk_is_quarantined() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let tuning = IndexTuning {
            verification_interval_ms: 0,
            ..IndexTuning::default()
        };
        let index = DataIndex::with_tuning(Arc::new(LocalFs), temp.path().join("index"), tuning)
            .expect("open index");
        let tree = temp.path().join("tree");
        fs::create_dir(&tree).expect("mkdir tree");

        let stored = index.insert(b"will be damaged").expect("insert");
        fs::hard_link(&stored.path, tree.join("ref")).expect("link");

        // Damage the body behind the index's back.
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&stored.path, fs::Permissions::from_mode(0o644)).expect("writable");
        fs::write(&stored.path, b"damaged!").expect("overwrite");
        // Age the file past the (zero) interval.
        LocalFs.utime(&stored.path, 0, 0).expect("age");

        let stats = index.cleanup(false).expect("cleanup");
        assert_eq!(stats.corrupt_found, 1);
        assert_eq!(stats.corrupt_without_sibling, 1);

        let mut corrupt = stored.name;
        corrupt.corrupt = true;
        let dir = stored.path.parent().expect("hash dir");
        assert!(dir.join(corrupt.file_name()).exists());
        assert!(!stored.path.exists());
    }

    #[test]
    fn fresh_chunks_are_not_reverified() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let index = test_index(temp.path().join("index"));
        let tree = temp.path().join("tree");
        fs::create_dir(&tree).expect("mkdir tree");

        let stored = index.insert(b"fresh chunk").expect("insert");
        fs::hard_link(&stored.path, tree.join("ref")).expect("link");

        // Default interval is seven days; a just-written chunk is skipped.
        let stats = index.cleanup(false).expect("cleanup");
        assert_eq!(stats.chunks_verified, 0);
    }
}
