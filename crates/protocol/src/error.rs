//! Error taxonomy for the wire layer.

use std::io;

use thiserror::Error;

/// Failures while encoding or decoding an archive stream.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The stream does not open with the `ParallelPack` magic.
    #[error("ParallelPack header not found")]
    HeaderNotFound,

    /// The stream version is not the one this reader speaks.
    #[error("Unsupported pack version {0}")]
    UnsupportedVersion(u32),

    /// A wire boolean was neither 0 nor 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBoolean(u8),

    /// A record carried an empty path.
    #[error("pack path is empty")]
    EmptyPath,

    /// A record path did not start with `/`.
    #[error("pack path does not start with '/': {0}")]
    RelativePath(String),

    /// Unknown record tag byte.
    #[error("unknown record kind {0}")]
    UnknownRecordKind(u8),

    /// A data frame count outside `[0, 32767]` that is not the `-1` sentinel.
    #[error("invalid data chunk count {0}")]
    InvalidDataCount(i16),

    /// A path message named a slot outside `0..=63`.
    #[error("invalid path slot {0}")]
    InvalidSlot(u8),

    /// A path message claimed more shared prefix than the slot holds.
    #[error("slot {slot} holds {available} bytes, message claims a {claimed}-byte prefix")]
    InvalidPrefix {
        /// Slot named by the message.
        slot: u8,
        /// Prefix length the message claimed.
        claimed: usize,
        /// Bytes actually remembered for the slot.
        available: usize,
    },

    /// An encoded path suffix would not fit the 16-bit length field.
    #[error("path suffix of {0} bytes exceeds the 16-bit length field")]
    PathTooLong(usize),

    /// A decoded path was not valid UTF-8.
    #[error("path is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Underlying transport failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<ProtocolError> for io::Error {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(inner) => inner,
            other => Self::new(io::ErrorKind::InvalidData, other),
        }
    }
}
