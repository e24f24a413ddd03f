//! Prefix-sharing path codec.
//!
//! Paths dominate the record stream, and consecutive entries from one source
//! share long directory prefixes. Each side keeps 64 remembered byte strings
//! (the *slots*); a path message is `slot byte, shared-prefix length byte,
//! 16-bit suffix length, suffix bytes`, and the decoded value is the
//! remembered prefix concatenated with the suffix. The packer dedicates one
//! slot per source and [`SYMLINK_TARGET_SLOT`](crate::SYMLINK_TARGET_SLOT)
//! to symlink targets so target strings never disturb entry-path sharing.

use std::io::{Read, Write};

use crate::consts::PATH_SLOTS;
use crate::error::ProtocolError;
use crate::wire::{read_u8, read_u16, write_u8, write_u16};

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Encoder half of the path codec.
#[derive(Debug)]
pub struct PathEncoder {
    slots: [Vec<u8>; PATH_SLOTS],
}

impl Default for PathEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PathEncoder {
    /// Creates an encoder with all slots empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Encodes `value` against `slot`, updating the slot's memory.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InvalidSlot`] for slots outside `0..64`, and
    /// [`ProtocolError::PathTooLong`] when the non-shared suffix exceeds the
    /// 16-bit length field.
    pub fn encode<W: Write>(
        &mut self,
        writer: &mut W,
        slot: u8,
        value: &str,
    ) -> Result<(), ProtocolError> {
        let index = usize::from(slot);
        if index >= PATH_SLOTS {
            return Err(ProtocolError::InvalidSlot(slot));
        }

        let bytes = value.as_bytes();
        let shared = common_prefix_len(&self.slots[index], bytes).min(usize::from(u8::MAX));
        let suffix = &bytes[shared..];
        let suffix_len =
            u16::try_from(suffix.len()).map_err(|_| ProtocolError::PathTooLong(suffix.len()))?;

        write_u8(writer, slot)?;
        write_u8(writer, shared as u8)?;
        write_u16(writer, suffix_len)?;
        writer.write_all(suffix)?;

        self.slots[index].clear();
        self.slots[index].extend_from_slice(bytes);
        Ok(())
    }
}

/// Decoder half of the path codec.
#[derive(Debug)]
pub struct PathDecoder {
    slots: [Vec<u8>; PATH_SLOTS],
}

impl Default for PathDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PathDecoder {
    /// Creates a decoder with all slots empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Decodes the next path message.
    ///
    /// # Errors
    ///
    /// Invalid slot indices, prefix claims exceeding the slot's remembered
    /// bytes, non-UTF-8 reconstructions, and transport failures.
    pub fn decode<R: Read>(&mut self, reader: &mut R) -> Result<String, ProtocolError> {
        let slot = read_u8(reader)?;
        let index = usize::from(slot);
        if index >= PATH_SLOTS {
            return Err(ProtocolError::InvalidSlot(slot));
        }

        let claimed = usize::from(read_u8(reader)?);
        let remembered = &self.slots[index];
        if claimed > remembered.len() {
            return Err(ProtocolError::InvalidPrefix {
                slot,
                claimed,
                available: remembered.len(),
            });
        }

        let suffix_len = usize::from(read_u16(reader)?);
        let mut value = Vec::with_capacity(claimed + suffix_len);
        value.extend_from_slice(&remembered[..claimed]);
        let start = value.len();
        value.resize(start + suffix_len, 0);
        reader.read_exact(&mut value[start..])?;

        self.slots[index].clear();
        self.slots[index].extend_from_slice(&value);
        Ok(String::from_utf8(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(paths: &[(u8, &str)]) {
        let mut encoder = PathEncoder::new();
        let mut buf = Vec::new();
        for (slot, path) in paths {
            encoder.encode(&mut buf, *slot, path).expect("encode");
        }

        let mut decoder = PathDecoder::new();
        let mut cursor = Cursor::new(buf);
        for (_, path) in paths {
            assert_eq!(decoder.decode(&mut cursor).expect("decode"), *path);
        }
    }

    #[test]
    fn paths_round_trip() {
        round_trip(&[
            (0, "/a"),
            (0, "/a/deep/nested/file"),
            (0, "/a/deep/nested/other"),
            (0, "/a/deep"),
            (0, "/b"),
        ]);
    }

    #[test]
    fn slots_are_independent() {
        round_trip(&[
            (0, "/src-one/file"),
            (1, "/src-two/file"),
            (0, "/src-one/file2"),
            (63, "relative/link target with spaces"),
            (1, "/src-two/sub/dir"),
        ]);
    }

    #[test]
    fn non_ascii_paths_round_trip() {
        round_trip(&[(0, "/α/β γ"), (0, "/α/βδ"), (63, "цель ссылки")]);
    }

    #[test]
    fn shared_prefix_shrinks_the_message() {
        let mut encoder = PathEncoder::new();
        let mut first = Vec::new();
        encoder
            .encode(&mut first, 0, "/some/deep/directory/one")
            .expect("encode");

        let mut second = Vec::new();
        encoder
            .encode(&mut second, 0, "/some/deep/directory/two")
            .expect("encode");

        // Only "two" plus the 4-byte frame should travel.
        assert_eq!(second.len(), 4 + 3);
    }

    #[test]
    fn invalid_slot_is_rejected() {
        let mut encoder = PathEncoder::new();
        let err = encoder
            .encode(&mut Vec::new(), 64, "/x")
            .expect_err("slot 64 invalid");
        assert!(matches!(err, ProtocolError::InvalidSlot(64)));
    }

    #[test]
    fn prefix_overclaim_is_rejected() {
        // slot 0, claim 5 shared bytes against an empty slot
        let message = [0u8, 5, 0, 1, b'x'];
        let mut decoder = PathDecoder::new();
        let err = decoder
            .decode(&mut Cursor::new(message))
            .expect_err("overclaimed prefix");
        assert!(matches!(
            err,
            ProtocolError::InvalidPrefix {
                slot: 0,
                claimed: 5,
                available: 0
            }
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let message = [0u8, 0, 0, 2, 0xff, 0xfe];
        let mut decoder = PathDecoder::new();
        let err = decoder
            .decode(&mut Cursor::new(message))
            .expect_err("invalid utf8");
        assert!(matches!(err, ProtocolError::InvalidUtf8(_)));
    }
}
