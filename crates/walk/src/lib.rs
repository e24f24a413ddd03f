#![deny(unsafe_code)]

//! # Overview
//!
//! Deterministic traversal for the packer. All source roots are walked in a
//! single logical interleaving, without threads: an ordered map keyed by
//! source-relative path always yields the globally next entry, and the key
//! order is byte-lexicographic *modified so that a string sorts after every
//! string that extends it*. Under that order a directory's key sorts after
//! all of its descendants' keys, so expanding each directory into the map
//! as soon as it is discovered yields post-order emission across every
//! source at once — exactly what the unpacker's deferred directory-mtime
//! restoration needs.
//!
//! The walker reports entries, it does not judge them: sockets, zero link
//! counts, and other pack-level rejections belong to the packer.

mod order;
mod walker;

pub use order::{PackOrderKey, compare_pack_paths};
pub use walker::{InterleavedWalker, WalkEntry, WalkError};
