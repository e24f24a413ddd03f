//! Length-prefixed file payload framing.
//!
//! A payload is a sequence of `(i16 count, count bytes)` frames closed by a
//! `-1` count. Counts are confined to `[0, 32767]`; any other negative value
//! is a stream corruption.

use std::io::{self, Read, Write};

use crate::consts::MAX_DATA_CHUNK;
use crate::error::ProtocolError;
use crate::wire::{read_i16, write_i16};

/// Writer for one file payload.
///
/// Call [`DataWriter::write_chunk`] for each block of bytes, then
/// [`DataWriter::finish`] to emit the terminator. Dropping the writer
/// without finishing leaves the stream mid-payload; the packer always
/// finishes.
#[derive(Debug)]
pub struct DataWriter<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> DataWriter<'a, W> {
    /// Starts a payload on `writer`.
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    /// Emits `chunk` as one or more frames.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ProtocolError> {
        for frame in chunk.chunks(MAX_DATA_CHUNK) {
            write_i16(self.writer, frame.len() as i16)?;
            self.writer.write_all(frame)?;
        }
        Ok(())
    }

    /// Closes the payload with the `-1` sentinel.
    pub fn finish(self) -> Result<(), ProtocolError> {
        write_i16(self.writer, -1)?;
        Ok(())
    }
}

/// Reader for one file payload.
///
/// Implements [`Read`] and reports EOF once the `-1` sentinel has been
/// consumed, so payloads stream through `io::copy` without buffering.
#[derive(Debug)]
pub struct DataReader<'a, R: Read> {
    reader: &'a mut R,
    remaining: usize,
    finished: bool,
}

impl<'a, R: Read> DataReader<'a, R> {
    /// Starts consuming a payload from `reader`.
    pub fn new(reader: &'a mut R) -> Self {
        Self {
            reader,
            remaining: 0,
            finished: false,
        }
    }

    /// True once the terminating sentinel has been consumed.
    #[must_use]
    pub const fn finished(&self) -> bool {
        self.finished
    }

    fn next_frame(&mut self) -> Result<(), ProtocolError> {
        debug_assert_eq!(self.remaining, 0);
        loop {
            match read_i16(self.reader)? {
                -1 => {
                    self.finished = true;
                    return Ok(());
                }
                count if count < 0 => return Err(ProtocolError::InvalidDataCount(count)),
                0 => {} // empty frame, keep looking for bytes or the sentinel
                count => {
                    self.remaining = count as usize;
                    return Ok(());
                }
            }
        }
    }

    /// Reads and discards the rest of the payload.
    pub fn drain(&mut self) -> Result<u64, ProtocolError> {
        let mut sink = io::sink();
        Ok(io::copy(self, &mut sink)?)
    }
}

impl<R: Read> Read for DataReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            self.next_frame().map_err(io::Error::from)?;
            if self.finished {
                return Ok(0);
            }
        }
        let take = buf.len().min(self.remaining);
        self.reader.read_exact(&mut buf[..take])?;
        self.remaining -= take;
        Ok(take)
    }
}
