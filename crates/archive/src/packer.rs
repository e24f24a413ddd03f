//! The pack engine.

use std::io::{Read, Write};
use std::path::PathBuf;

use flate2::Compression;
use flate2::write::GzEncoder;
use posix_fs::{NodeKind, PosixFs};
use protocol::{BUFFER_SIZE, FileMeta, RecordWriter, Tag, write_stream_header};
use rustc_hash::FxHashMap;
use tracing::debug;
use walk::{InterleavedWalker, WalkEntry};

use crate::cancel::CancelToken;
use crate::error::ArchiveError;
use crate::verbose::VerbosePrinter;

/// Streaming packer over one or more source roots.
///
/// Hard links are coalesced on the fly: the first member of a multi-link
/// group travels with metadata, payload, and the group size; later members
/// travel as a bare link id. The `(device, inode)` table holds only
/// in-flight groups, so memory tracks concurrency rather than tree size.
pub struct Packer<'a> {
    fs: &'a dyn PosixFs,
    compress: bool,
    verbose: Option<&'a VerbosePrinter>,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Packer<'a> {
    /// Creates a packer over `fs` with compression off.
    pub fn new(fs: &'a dyn PosixFs) -> Self {
        Self {
            fs,
            compress: false,
            verbose: None,
            cancel: None,
        }
    }

    /// Enables gzip framing of everything after the stream preamble.
    #[must_use]
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Streams each packed archive path through `printer`.
    #[must_use]
    pub fn verbose(mut self, printer: &'a VerbosePrinter) -> Self {
        self.verbose = Some(printer);
        self
    }

    /// Observes `token` at the top of each record.
    #[must_use]
    pub fn cancel_token(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Packs `sources` into `output`, flushing before returning.
    pub fn pack<W: Write>(&self, sources: &[PathBuf], mut output: W) -> Result<(), ArchiveError> {
        write_stream_header(&mut output, self.compress)?;

        if self.compress {
            let encoder = GzEncoder::new(output, Compression::default());
            let mut writer = RecordWriter::new(encoder);
            self.emit_records(sources, &mut writer)?;
            let mut output = writer.into_inner().finish()?;
            output.flush()?;
        } else {
            let mut writer = RecordWriter::new(output);
            self.emit_records(sources, &mut writer)?;
            writer.flush()?;
        }
        Ok(())
    }

    fn check_cancel(&self) -> std::io::Result<()> {
        match self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    fn emit_records<W: Write>(
        &self,
        sources: &[PathBuf],
        writer: &mut RecordWriter<W>,
    ) -> Result<(), ArchiveError> {
        let walker = InterleavedWalker::new(self.fs, sources)?;
        // (device, inode) -> (link id, references still expected)
        let mut links: FxHashMap<(u64, u64), (u64, u64)> = FxHashMap::default();
        let mut next_link_id: u64 = 1;

        for entry in walker {
            self.check_cancel()?;
            // Slot 63 is reserved for symlink targets.
            let slot = (entry.source % 63) as u8;

            match entry.stat.kind {
                NodeKind::Socket => return Err(ArchiveError::Socket(entry.path)),
                NodeKind::Regular => {
                    self.emit_regular(writer, &entry, slot, &mut links, &mut next_link_id)?;
                }
                NodeKind::Directory => {
                    writer.write_tag(Tag::Directory)?;
                    writer.write_path(slot, &entry.pack_path)?;
                    writer.write_meta(&meta_of(&entry))?;
                }
                NodeKind::Symlink => {
                    let target = self.fs.read_link(&entry.path)?;
                    let target = target
                        .to_str()
                        .ok_or_else(|| ArchiveError::NonUtf8LinkTarget(entry.path.clone()))?;
                    writer.write_tag(Tag::Symlink)?;
                    writer.write_path(slot, &entry.pack_path)?;
                    writer.write_owner(entry.stat.uid, entry.stat.gid)?;
                    writer.write_symlink_target(target)?;
                }
                NodeKind::BlockDevice | NodeKind::CharacterDevice => {
                    let tag = if entry.stat.kind == NodeKind::BlockDevice {
                        Tag::BlockDevice
                    } else {
                        Tag::CharacterDevice
                    };
                    writer.write_tag(tag)?;
                    writer.write_path(slot, &entry.pack_path)?;
                    writer.write_owner(entry.stat.uid, entry.stat.gid)?;
                    writer.write_mode(u64::from(entry.stat.mode))?;
                    writer.write_device(entry.stat.rdev)?;
                }
                NodeKind::Fifo => {
                    writer.write_tag(Tag::Fifo)?;
                    writer.write_path(slot, &entry.pack_path)?;
                    writer.write_owner(entry.stat.uid, entry.stat.gid)?;
                    writer.write_mode(u64::from(entry.stat.mode))?;
                }
            }

            if let Some(printer) = self.verbose {
                printer.emit(&entry.pack_path)?;
            }
        }

        writer.write_tag(Tag::End)?;
        debug!("pack stream complete");
        Ok(())
    }

    fn emit_regular<W: Write>(
        &self,
        writer: &mut RecordWriter<W>,
        entry: &WalkEntry,
        slot: u8,
        links: &mut FxHashMap<(u64, u64), (u64, u64)>,
        next_link_id: &mut u64,
    ) -> Result<(), ArchiveError> {
        let nlink = entry.stat.nlink;
        if nlink < 1 {
            return Err(ArchiveError::InvalidLinkCount {
                path: entry.path.clone(),
                nlink,
            });
        }

        writer.write_tag(Tag::RegularFile)?;
        writer.write_path(slot, &entry.pack_path)?;

        if nlink > 1 {
            let key = (entry.stat.dev, entry.stat.ino);
            if let Some((link_id, remaining)) = links.get_mut(&key) {
                // Later group member: the link id alone is the whole record.
                writer.write_link_id(*link_id)?;
                *remaining -= 1;
                if *remaining == 0 {
                    links.remove(&key);
                }
                return Ok(());
            }

            let link_id = *next_link_id;
            *next_link_id += 1;
            links.insert(key, (link_id, nlink - 1));
            writer.write_link_id(link_id)?;
            writer.write_meta(&meta_of(entry))?;
            writer.write_num_links(nlink as u32)?;
        } else {
            writer.write_link_id(0)?;
            writer.write_meta(&meta_of(entry))?;
        }

        self.emit_payload(writer, entry)
    }

    fn emit_payload<W: Write>(
        &self,
        writer: &mut RecordWriter<W>,
        entry: &WalkEntry,
    ) -> Result<(), ArchiveError> {
        let mut source = self.fs.open(&entry.path)?;
        let mut data = writer.data_writer();
        let mut buf = [0u8; BUFFER_SIZE];
        loop {
            let read = source.read(&mut buf)?;
            if read == 0 {
                break;
            }
            data.write_chunk(&buf[..read])?;
        }
        data.finish()?;
        Ok(())
    }
}

fn meta_of(entry: &WalkEntry) -> FileMeta {
    FileMeta {
        uid: entry.stat.uid,
        gid: entry.stat.gid,
        mode: u64::from(entry.stat.mode),
        mtime_ms: entry.stat.mtime_ms,
    }
}
