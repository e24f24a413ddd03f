//! Record-level framing.
//!
//! The engines drive these types field by field rather than through a
//! monolithic record value: the field set of a regular-file record depends
//! on link state only the engines hold (a link id already seen by the
//! receiver carries no metadata or payload at all).

use std::io::{Read, Write};

use crate::consts::{HEADER, SYMLINK_TARGET_SLOT, VERSION};
use crate::data::{DataReader, DataWriter};
use crate::error::ProtocolError;
use crate::text::{PathDecoder, PathEncoder};
use crate::wire::{
    read_bool, read_u8, read_u32, read_u64, read_i64, write_bool, write_u8, write_u32, write_u64,
    write_i64,
};

/// Record tag byte.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Tag {
    /// Regular file, possibly a member of a hard-link group.
    RegularFile = 0,
    /// Directory.
    Directory = 1,
    /// Symbolic link.
    Symlink = 2,
    /// Block device node.
    BlockDevice = 3,
    /// Character device node.
    CharacterDevice = 4,
    /// Named pipe.
    Fifo = 5,
    /// End of stream. Doubles as the TCP completion ACK byte.
    End = 6,
}

impl Tag {
    /// The wire byte for this tag.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses a tag byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Self::RegularFile),
            1 => Ok(Self::Directory),
            2 => Ok(Self::Symlink),
            3 => Ok(Self::BlockDevice),
            4 => Ok(Self::CharacterDevice),
            5 => Ok(Self::Fifo),
            6 => Ok(Self::End),
            other => Err(ProtocolError::UnknownRecordKind(other)),
        }
    }
}

/// Ownership, mode, and mtime fields shared by several record kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileMeta {
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Permission and special bits (wire `long`).
    pub mode: u64,
    /// Modification time, millisecond epoch (wire `long`).
    pub mtime_ms: i64,
}

/// Writes the stream preamble: magic, version, compression flag.
///
/// Everything after the flag byte is gzip-framed when `compressed` is set,
/// so the caller wraps the writer *after* this call.
pub fn write_stream_header<W: Write>(
    writer: &mut W,
    compressed: bool,
) -> Result<(), ProtocolError> {
    writer.write_all(HEADER)?;
    write_u32(writer, VERSION)?;
    write_bool(writer, compressed)?;
    Ok(())
}

/// Reads and validates the stream preamble, returning the compression flag.
pub fn read_stream_header<R: Read>(reader: &mut R) -> Result<bool, ProtocolError> {
    let mut magic = [0u8; HEADER.len()];
    reader.read_exact(&mut magic)?;
    if &magic != HEADER {
        return Err(ProtocolError::HeaderNotFound);
    }
    let version = read_u32(reader)?;
    if version != VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }
    read_bool(reader)
}

fn validate_pack_path(path: &str) -> Result<(), ProtocolError> {
    if path.is_empty() {
        return Err(ProtocolError::EmptyPath);
    }
    if !path.starts_with('/') {
        return Err(ProtocolError::RelativePath(path.to_owned()));
    }
    Ok(())
}

/// Field-level writer for the record section of a stream.
#[derive(Debug)]
pub struct RecordWriter<W: Write> {
    writer: W,
    paths: PathEncoder,
}

impl<W: Write> RecordWriter<W> {
    /// Wraps `writer` (already positioned after the preamble, already
    /// gzip-framed when the stream is compressed).
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            paths: PathEncoder::new(),
        }
    }

    /// Writes a record tag.
    pub fn write_tag(&mut self, tag: Tag) -> Result<(), ProtocolError> {
        write_u8(&mut self.writer, tag.as_u8())
    }

    /// Writes an entry path against `slot`. The path must be `/`-rooted.
    pub fn write_path(&mut self, slot: u8, path: &str) -> Result<(), ProtocolError> {
        validate_pack_path(path)?;
        self.paths.encode(&mut self.writer, slot, path)
    }

    /// Writes a symlink target through the reserved target slot.
    pub fn write_symlink_target(&mut self, target: &str) -> Result<(), ProtocolError> {
        self.paths
            .encode(&mut self.writer, SYMLINK_TARGET_SLOT, target)
    }

    /// Writes the shared uid/gid/mode/mtime block.
    pub fn write_meta(&mut self, meta: &FileMeta) -> Result<(), ProtocolError> {
        write_u32(&mut self.writer, meta.uid)?;
        write_u32(&mut self.writer, meta.gid)?;
        write_u64(&mut self.writer, meta.mode)?;
        write_i64(&mut self.writer, meta.mtime_ms)
    }

    /// Writes the uid/gid pair alone (symlink records carry no mode/mtime).
    pub fn write_owner(&mut self, uid: u32, gid: u32) -> Result<(), ProtocolError> {
        write_u32(&mut self.writer, uid)?;
        write_u32(&mut self.writer, gid)
    }

    /// Writes a regular-file link id (0 = not hard-linked).
    pub fn write_link_id(&mut self, link_id: u64) -> Result<(), ProtocolError> {
        write_u64(&mut self.writer, link_id)
    }

    /// Writes the link-group size for a first-seen link id.
    pub fn write_num_links(&mut self, num_links: u32) -> Result<(), ProtocolError> {
        write_u32(&mut self.writer, num_links)
    }

    /// Writes a bare mode field (device and FIFO records carry no mtime).
    pub fn write_mode(&mut self, mode: u64) -> Result<(), ProtocolError> {
        write_u64(&mut self.writer, mode)
    }

    /// Writes a device identifier.
    pub fn write_device(&mut self, device: u64) -> Result<(), ProtocolError> {
        write_u64(&mut self.writer, device)
    }

    /// Starts a file payload.
    pub fn data_writer(&mut self) -> DataWriter<'_, W> {
        DataWriter::new(&mut self.writer)
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Unwraps the inner writer (needed to finish a gzip frame).
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Field-level reader for the record section of a stream.
#[derive(Debug)]
pub struct RecordReader<R: Read> {
    reader: R,
    paths: PathDecoder,
}

impl<R: Read> RecordReader<R> {
    /// Wraps `reader` (already positioned after the preamble, already
    /// gzip-framed when the stream is compressed).
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            paths: PathDecoder::new(),
        }
    }

    /// Reads the next record tag.
    pub fn read_tag(&mut self) -> Result<Tag, ProtocolError> {
        Tag::from_u8(read_u8(&mut self.reader)?)
    }

    /// Reads and validates an entry path.
    pub fn read_path(&mut self) -> Result<String, ProtocolError> {
        let path = self.paths.decode(&mut self.reader)?;
        validate_pack_path(&path)?;
        Ok(path)
    }

    /// Reads a symlink target (no `/`-rooting requirement).
    pub fn read_symlink_target(&mut self) -> Result<String, ProtocolError> {
        self.paths.decode(&mut self.reader)
    }

    /// Reads the shared uid/gid/mode/mtime block.
    pub fn read_meta(&mut self) -> Result<FileMeta, ProtocolError> {
        Ok(FileMeta {
            uid: read_u32(&mut self.reader)?,
            gid: read_u32(&mut self.reader)?,
            mode: read_u64(&mut self.reader)?,
            mtime_ms: read_i64(&mut self.reader)?,
        })
    }

    /// Reads a uid/gid pair.
    pub fn read_owner(&mut self) -> Result<(u32, u32), ProtocolError> {
        Ok((read_u32(&mut self.reader)?, read_u32(&mut self.reader)?))
    }

    /// Reads a regular-file link id.
    pub fn read_link_id(&mut self) -> Result<u64, ProtocolError> {
        read_u64(&mut self.reader)
    }

    /// Reads a link-group size.
    pub fn read_num_links(&mut self) -> Result<u32, ProtocolError> {
        read_u32(&mut self.reader)
    }

    /// Reads a bare mode field.
    pub fn read_mode(&mut self) -> Result<u64, ProtocolError> {
        read_u64(&mut self.reader)
    }

    /// Reads a device identifier.
    pub fn read_device(&mut self) -> Result<u64, ProtocolError> {
        read_u64(&mut self.reader)
    }

    /// Starts consuming a file payload.
    pub fn data_reader(&mut self) -> DataReader<'_, R> {
        DataReader::new(&mut self.reader)
    }
}
