//! The chunk filename grammar.
//!
//! `<rem28>-<lenHex>-<collision>-<link>[.gz][.corrupt]` inside a hash
//! directory named by the first four hex characters of the MD5. Everything
//! the index needs to know about a chunk short of its bytes is recoverable
//! from its name.

use std::fmt::Write as _;

/// Suffix marking gzip-compressed chunk bodies.
pub const GZ_SUFFIX: &str = ".gz";

/// Suffix marking chunks the verifier found damaged. Always last.
pub const CORRUPT_SUFFIX: &str = ".corrupt";

/// Name of the advisory-lock sentinel inside each hash directory.
pub const LOCK_FILE_NAME: &str = "lock";

/// Parsed form of one chunk file name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkName {
    /// Full content MD5 (hash-directory bits included).
    pub md5: [u8; 16],
    /// Uncompressed content length.
    pub len: u64,
    /// Collision ordinal: distinct byte sequences sharing an MD5.
    pub collision: u32,
    /// Link-copy ordinal: physical replicas of one collision.
    pub link: u32,
    /// Body is stored gzip-compressed.
    pub gz: bool,
    /// Flagged by the verifier; never receives new references.
    pub corrupt: bool,
}

fn push_hex(out: &mut String, bytes: &[u8]) {
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to a String cannot fail");
    }
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

fn parse_hex_bytes(text: &str, out: &mut [u8]) -> Option<()> {
    let bytes = text.as_bytes();
    if bytes.len() != out.len() * 2 {
        return None;
    }
    for (i, slot) in out.iter_mut().enumerate() {
        let hi = hex_nibble(bytes[2 * i])?;
        let lo = hex_nibble(bytes[2 * i + 1])?;
        *slot = (hi << 4) | lo;
    }
    Some(())
}

/// Renders a length as the grammar's `<lenHex>`: `<n>M` for multiples of
/// 0x100000, `<n>k` for multiples of 0x400, bare lowercase hex otherwise.
#[must_use]
pub fn encode_len_hex(len: u64) -> String {
    if len == 0 {
        "0".to_owned()
    } else if len % 0x10_0000 == 0 {
        format!("{:x}M", len / 0x10_0000)
    } else if len % 0x400 == 0 {
        format!("{:x}k", len / 0x400)
    } else {
        format!("{len:x}")
    }
}

/// Parses a `<lenHex>` field.
#[must_use]
pub fn decode_len_hex(text: &str) -> Option<u64> {
    if let Some(mega) = text.strip_suffix('M') {
        u64::from_str_radix(mega, 16)
            .ok()?
            .checked_mul(0x10_0000)
    } else if let Some(kilo) = text.strip_suffix('k') {
        u64::from_str_radix(kilo, 16).ok()?.checked_mul(0x400)
    } else {
        u64::from_str_radix(text, 16).ok()
    }
}

impl ChunkName {
    /// The hash-directory name: first 16 bits of the MD5 as 4 hex chars.
    #[must_use]
    pub fn hash_dir(&self) -> String {
        let mut out = String::with_capacity(4);
        push_hex(&mut out, &self.md5[..2]);
        out
    }

    /// The file name inside the hash directory.
    #[must_use]
    pub fn file_name(&self) -> String {
        let mut out = String::with_capacity(40);
        push_hex(&mut out, &self.md5[2..]);
        write!(
            out,
            "-{}-{:x}-{:x}",
            encode_len_hex(self.len),
            self.collision,
            self.link
        )
        .expect("writing to a String cannot fail");
        if self.gz {
            out.push_str(GZ_SUFFIX);
        }
        if self.corrupt {
            out.push_str(CORRUPT_SUFFIX);
        }
        out
    }

    /// Parses a file name found in the hash directory `dir`.
    ///
    /// Returns `None` for names outside the grammar (including the `lock`
    /// sentinel).
    #[must_use]
    pub fn parse(dir: &str, name: &str) -> Option<Self> {
        let mut md5 = [0u8; 16];
        parse_hex_bytes(dir, &mut md5[..2])?;

        let (name, corrupt) = match name.strip_suffix(CORRUPT_SUFFIX) {
            Some(stem) => (stem, true),
            None => (name, false),
        };
        let (name, gz) = match name.strip_suffix(GZ_SUFFIX) {
            Some(stem) => (stem, true),
            None => (name, false),
        };

        let mut fields = name.splitn(4, '-');
        let rem28 = fields.next()?;
        let len_hex = fields.next()?;
        let collision = fields.next()?;
        let link = fields.next()?;

        parse_hex_bytes(rem28, &mut md5[2..])?;
        Some(Self {
            md5,
            len: decode_len_hex(len_hex)?,
            collision: u32::from_str_radix(collision, 16).ok()?,
            link: u32::from_str_radix(link, 16).ok()?,
            gz,
            corrupt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_md5() -> [u8; 16] {
        [
            0xab, 0x12, 0xcd, 0x34, 0xef, 0x56, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef,
            0x10, 0x32,
        ]
    }

    #[test]
    fn len_hex_uses_block_suffixes() {
        assert_eq!(encode_len_hex(0x10_0000), "1M");
        assert_eq!(encode_len_hex(0x30_0000), "3M");
        assert_eq!(encode_len_hex(0x400), "1k");
        assert_eq!(encode_len_hex(0x1000), "4k");
        assert_eq!(encode_len_hex(0x1001), "1001");
        assert_eq!(encode_len_hex(2), "2");
        assert_eq!(encode_len_hex(0), "0");
    }

    #[test]
    fn len_hex_round_trips() {
        for len in [1, 2, 0x3ff, 0x400, 0x401, 0x1000, 0x10_0000, 0xdead_beef] {
            assert_eq!(
                decode_len_hex(&encode_len_hex(len)),
                Some(len),
                "length {len:#x}"
            );
        }
    }

    #[test]
    fn file_name_matches_grammar() {
        let name = ChunkName {
            md5: sample_md5(),
            len: 0x1000,
            collision: 0,
            link: 0,
            gz: false,
            corrupt: false,
        };
        assert_eq!(name.hash_dir(), "ab12");
        assert_eq!(name.file_name(), "cd34ef560123456789abcdef1032-4k-0-0");
    }

    #[test]
    fn suffix_order_is_gz_then_corrupt() {
        let name = ChunkName {
            md5: sample_md5(),
            len: 7,
            collision: 1,
            link: 2,
            gz: true,
            corrupt: true,
        };
        assert!(name.file_name().ends_with("-7-1-2.gz.corrupt"));
    }

    #[test]
    fn parse_inverts_formatting() {
        for (gz, corrupt) in [(false, false), (true, false), (false, true), (true, true)] {
            let name = ChunkName {
                md5: sample_md5(),
                len: 0x1234,
                collision: 3,
                link: 0x1f,
                gz,
                corrupt,
            };
            let parsed =
                ChunkName::parse(&name.hash_dir(), &name.file_name()).expect("parse back");
            assert_eq!(parsed, name);
        }
    }

    #[test]
    fn lock_sentinel_does_not_parse() {
        assert_eq!(ChunkName::parse("ab12", LOCK_FILE_NAME), None);
    }

    #[test]
    fn malformed_names_do_not_parse() {
        for name in [
            "",
            "short-4k-0-0",
            "cd34ef560123456789abcdef1032-4k-0",
            "cd34ef560123456789abcdef1032-zz-0-0",
            "cd34ef560123456789abcdef1032-4k-0-0.zip",
            "CD34EF560123456789ABCDEF1032-4k-0-0",
        ] {
            assert_eq!(ChunkName::parse("ab12", name), None, "{name}");
        }
    }
}
