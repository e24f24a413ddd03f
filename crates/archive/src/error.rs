//! Engine error taxonomy.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures from the pack and unpack engines.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Wire-format violation.
    #[error(transparent)]
    Protocol(#[from] protocol::ProtocolError),

    /// Source traversal failure.
    #[error(transparent)]
    Walk(#[from] walk::WalkError),

    /// Sockets cannot travel in an archive.
    #[error("Unable to pack socket: {0}")]
    Socket(PathBuf),

    /// A stat reported a link count below one.
    #[error("invalid link count {nlink} for {path}")]
    InvalidLinkCount {
        /// Offending source path.
        path: PathBuf,
        /// The reported count.
        nlink: u64,
    },

    /// A symlink target that cannot travel as UTF-8.
    #[error("symlink target is not valid UTF-8: {0}")]
    NonUtf8LinkTarget(PathBuf),

    /// Unpack target node already exists and `force` is off.
    #[error("target already exists: {0}")]
    TargetExists(PathBuf),

    /// Unpack destination is missing or not a directory.
    #[error("unpack target is not an existing directory: {0}")]
    BadDestination(PathBuf),

    /// The TCP peer closed without acknowledging completion.
    #[error("peer closed the connection without acknowledging completion")]
    MissingAck,

    /// The TCP peer acknowledged with an unexpected byte.
    #[error("unexpected completion acknowledgement byte {0:#04x}")]
    BadAck(u8),

    /// Dedup index failure while writing a deduplicating target.
    #[error(transparent)]
    Index(#[from] dedup::IndexError),

    /// Underlying I/O failure (including cancellation, surfaced as
    /// [`io::ErrorKind::Interrupted`]).
    #[error(transparent)]
    Io(#[from] io::Error),
}
