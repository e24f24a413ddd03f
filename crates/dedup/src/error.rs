//! Index error taxonomy.

use std::io;

use thiserror::Error;

/// Failures surfaced by the chunk index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Zero-length content is never indexed.
    #[error("zero-length chunks are not indexed")]
    EmptyChunk,

    /// The index root exists but is not a directory.
    #[error("index root is not a directory: {0}")]
    RootNotADirectory(std::path::PathBuf),

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}
