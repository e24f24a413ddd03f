//! Big-endian primitive readers and writers.

use std::io::{Read, Write};

use crate::error::ProtocolError;

/// Reads exactly `buf.len()` bytes.
pub fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    reader.read_exact(buf)?;
    Ok(())
}

/// Reads one byte.
pub fn read_u8<R: Read>(reader: &mut R) -> Result<u8, ProtocolError> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads a big-endian `u16`.
pub fn read_u16<R: Read>(reader: &mut R) -> Result<u16, ProtocolError> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Reads a big-endian `i16`.
pub fn read_i16<R: Read>(reader: &mut R) -> Result<i16, ProtocolError> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(i16::from_be_bytes(buf))
}

/// Reads a big-endian `u32`.
pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32, ProtocolError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Reads a big-endian `u64`.
pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64, ProtocolError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Reads a big-endian `i64`.
pub fn read_i64<R: Read>(reader: &mut R) -> Result<i64, ProtocolError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

/// Reads a one-byte boolean, rejecting anything but 0 and 1.
pub fn read_bool<R: Read>(reader: &mut R) -> Result<bool, ProtocolError> {
    match read_u8(reader)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ProtocolError::InvalidBoolean(other)),
    }
}

/// Writes one byte.
pub fn write_u8<W: Write>(writer: &mut W, value: u8) -> Result<(), ProtocolError> {
    writer.write_all(&[value])?;
    Ok(())
}

/// Writes a big-endian `u16`.
pub fn write_u16<W: Write>(writer: &mut W, value: u16) -> Result<(), ProtocolError> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Writes a big-endian `i16`.
pub fn write_i16<W: Write>(writer: &mut W, value: i16) -> Result<(), ProtocolError> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Writes a big-endian `u32`.
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<(), ProtocolError> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Writes a big-endian `u64`.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<(), ProtocolError> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Writes a big-endian `i64`.
pub fn write_i64<W: Write>(writer: &mut W, value: i64) -> Result<(), ProtocolError> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

/// Writes a one-byte boolean.
pub fn write_bool<W: Write>(writer: &mut W, value: bool) -> Result<(), ProtocolError> {
    write_u8(writer, u8::from(value))
}
