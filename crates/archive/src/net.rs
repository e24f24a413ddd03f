//! TCP transport for the pack stream.
//!
//! One archive, one connection. The packer connects out, streams, and then
//! blocks on a single acknowledgement byte so a clean peer-side EOF is
//! distinguishable from a completed unpack: the packer does not report
//! success until the byte arrives. The listening unpacker accepts exactly
//! one connection and writes that byte after consuming a clean END.

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};

use protocol::Tag;
use tracing::{debug, info};

use crate::error::ArchiveError;
use crate::packer::Packer;
use crate::unpacker::Unpacker;

/// Streams a pack to `host:port` and waits for the completion ACK.
pub fn pack_to_host(
    packer: &Packer<'_>,
    sources: &[PathBuf],
    host: &str,
    port: u16,
) -> Result<(), ArchiveError> {
    let stream = TcpStream::connect((host, port))?;
    debug!(host, port, "connected to unpack peer");

    let mut writer = BufWriter::new(stream.try_clone()?);
    packer.pack(sources, &mut writer)?;
    writer.flush()?;

    // Happens-before edge: success is reported only after the peer confirms
    // it consumed END.
    let mut reader = stream;
    let mut ack = [0u8; 1];
    match reader.read_exact(&mut ack) {
        Ok(()) if ack[0] == Tag::End.as_u8() => {
            debug!("peer acknowledged completion");
            Ok(())
        }
        Ok(()) => Err(ArchiveError::BadAck(ack[0])),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ArchiveError::MissingAck)
        }
        Err(err) => Err(err.into()),
    }
}

/// Accepts exactly one connection on `bind:port`, unpacks it into `dest`,
/// and acknowledges completion with a single END byte.
pub fn unpack_listen(
    unpacker: &Unpacker<'_>,
    dest: &Path,
    bind: &str,
    port: u16,
) -> Result<(), ArchiveError> {
    let listener = TcpListener::bind((bind, port))?;
    info!(bind, port, "listening for one pack connection");
    let (stream, peer) = listener.accept()?;
    debug!(%peer, "accepted pack connection");
    drop(listener);

    let reader = BufReader::new(stream.try_clone()?);
    unpacker.unpack(reader, dest)?;

    let mut ack_writer = stream;
    ack_writer.write_all(&[Tag::End.as_u8()])?;
    ack_writer.flush()?;
    Ok(())
}
