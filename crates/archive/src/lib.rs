#![deny(unsafe_code)]

//! # Overview
//!
//! The pack and unpack engines. [`Packer`] walks one or more source trees in
//! a merge-sorted post-order interleaving and emits one ParallelPack byte
//! stream; [`Unpacker`] consumes such a stream into a target directory,
//! replaying hard-link groups and deferring directory mtimes until every
//! descendant is in place.
//!
//! Both engines are single-threaded by design; the only auxiliary thread is
//! the optional verbose printer behind a bounded queue. Cancellation is
//! cooperative through [`CancelToken`], observed at the top of each record
//! and surfaced as an interrupted-I/O failure. Even on error or
//! cancellation the unpacker drains its directory-mtime stacks, so
//! partially unpacked trees keep the timestamps they were meant to have.
//!
//! TCP transport lives in [`net`]: the packer connects out and blocks on a
//! one-byte completion acknowledgement; the unpacker listens for exactly
//! one connection and sends that byte after a clean end-of-stream.

mod cancel;
mod error;
pub mod net;
mod packer;
mod unpacker;
mod verbose;

pub use cancel::CancelToken;
pub use error::ArchiveError;
pub use packer::Packer;
pub use unpacker::Unpacker;
pub use verbose::VerbosePrinter;
