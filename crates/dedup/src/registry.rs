//! Process-wide index registry.
//!
//! One [`DataIndex`] per root, shared by every consumer in the process so
//! the per-root lock tables actually serialise writers. Lazily initialised
//! behind a single mutex rather than relying on static construction order.

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use posix_fs::PosixFs;
use rustc_hash::FxHashMap;

use crate::error::IndexError;
use crate::index::DataIndex;

type Registry = Mutex<FxHashMap<std::path::PathBuf, Arc<DataIndex>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Returns the shared index for `root`, opening it on first request.
pub fn index_for(fs: Arc<dyn PosixFs>, root: &Path) -> Result<Arc<DataIndex>, IndexError> {
    let registry = REGISTRY.get_or_init(|| Mutex::new(FxHashMap::default()));
    let mut map = registry.lock().expect("index registry poisoned");
    if let Some(existing) = map.get(root) {
        return Ok(Arc::clone(existing));
    }
    let index = Arc::new(DataIndex::open(fs, root.to_path_buf())?);
    map.insert(root.to_path_buf(), Arc::clone(&index));
    Ok(index)
}
