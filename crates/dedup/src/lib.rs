#![deny(unsafe_code)]

//! # Overview
//!
//! A content-addressed chunk store that deduplicates file data across
//! consumer trees through hard links. Chunks live under a two-level layout:
//! the first 16 bits of the content MD5 name a *hash directory*, and the
//! file name inside it encodes the remaining 112 bits, the uncompressed
//! length, a collision ordinal (distinct byte sequences sharing an MD5), a
//! link-copy ordinal (physical replicas working around the per-inode
//! hard-link ceiling and providing redundancy for corruption recovery), an
//! optional `.gz` marker for compressed storage, and an optional `.corrupt`
//! marker set by the verifier:
//!
//! ```text
//! <root>/<first4hex>/<rem28>-<lenHex>-<collision>-<link>[.gz][.corrupt]
//! ```
//!
//! Writers serialise per hash directory: an in-process non-reentrant mutex
//! nested around an exclusive advisory `flock` on the directory's `lock`
//! sentinel. With 2^16 independent hash directories, unrelated inserts
//! proceed in parallel.
//!
//! Losing the whole index is recoverable by design: chunks are re-created
//! lazily from the hard-linked instances that survive in consumer trees.

mod cleanup;
mod error;
mod index;
mod lock;
mod name;
mod registry;

pub use cleanup::CleanupStats;
pub use error::IndexError;
pub use index::{DataIndex, IndexTuning, StoredChunk};
pub use name::{ChunkName, decode_len_hex, encode_len_hex};
pub use registry::index_for;
