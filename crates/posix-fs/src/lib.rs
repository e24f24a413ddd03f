#![deny(unsafe_code)]

//! # Overview
//!
//! `posix_fs` is the narrow filesystem contract consumed by the pack and
//! dedup engines. The [`PosixFs`] trait covers exactly the operations the
//! engines need (stat, exclusive creation, listing, advisory locking, link
//! and node creation, ownership/mode/time restoration) and nothing more, so
//! alternative backends can be injected for testing or for deduplicating
//! targets without the engines knowing.
//!
//! [`LocalFs`] is the production implementation over the host filesystem.
//! Metadata is surfaced through the [`Stat`] value record with millisecond
//! timestamps, matching the archive wire format.
//!
//! # Examples
//!
//! ```
//! use posix_fs::{LocalFs, NodeKind, PosixFs};
//!
//! let temp = tempfile::tempdir().unwrap();
//! let fs = LocalFs;
//! let dir = temp.path().join("sub");
//! fs.create_directory(&dir, 0o755).unwrap();
//! let stat = fs.stat(&dir).unwrap();
//! assert!(stat.exists);
//! assert_eq!(stat.kind, NodeKind::Directory);
//! ```

mod fs;
mod local;
mod lock;
mod path;
mod stat;

pub use fs::PosixFs;
pub use local::LocalFs;
pub use lock::ScopedFlock;
pub use path::{NAME_MAX, PathComponentError, validate_component};
pub use stat::{NodeKind, Stat};
