#![deny(unsafe_code)]

//! # Overview
//!
//! The ParallelPack version-3 wire format. An archive stream is:
//!
//! 1. the literal ASCII bytes `ParallelPack`,
//! 2. a 32-bit big-endian version (currently `3`),
//! 3. a one-byte compression flag,
//! 4. (gzip-framed when the flag is set) a sequence of tagged records,
//! 5. a single [`Tag::End`] byte.
//!
//! Every non-End record starts with a path encoded through the 64-slot
//! prefix-sharing codec ([`PathEncoder`] / [`PathDecoder`]); regular-file
//! payloads travel as length-prefixed chunks terminated by a `-1` count
//! ([`DataWriter`] / [`DataReader`]). All multi-byte integers are
//! big-endian.
//!
//! The crate is purely about bytes: it performs no filesystem access and
//! holds no policy. The pack and unpack engines drive [`RecordWriter`] and
//! [`RecordReader`] record by record, because the field set of a
//! regular-file record depends on receiver-side link state (§ record
//! layouts in the format notes of the `archive` crate).

mod consts;
mod data;
mod error;
mod record;
mod text;
mod wire;

pub use consts::{
    BUFFER_SIZE, DEFAULT_PORT, HEADER, MAX_DATA_CHUNK, PATH_SLOTS, SYMLINK_TARGET_SLOT, VERSION,
};
pub use data::{DataReader, DataWriter};
pub use error::ProtocolError;
pub use record::{
    FileMeta, RecordReader, RecordWriter, Tag, read_stream_header, write_stream_header,
};
pub use text::{PathDecoder, PathEncoder};
pub use wire::{
    read_bool, read_exact, read_i16, read_i64, read_u8, read_u16, read_u32, read_u64, write_bool,
    write_i16, write_i64, write_u8, write_u16, write_u32, write_u64,
};
