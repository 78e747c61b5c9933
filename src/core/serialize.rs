// Consensus encoding helpers for raw blocks and transactions

use crate::error::{Error, Result};
use std::io::{self, Read, Write};

/// Write a variable-length integer (CompactSize)
pub fn write_varint<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    match value {
        0..=0xfc => writer.write_all(&[value as u8]),
        0xfd..=0xffff => {
            writer.write_all(&[0xfd])?;
            writer.write_all(&(value as u16).to_le_bytes())
        }
        0x10000..=0xffffffff => {
            writer.write_all(&[0xfe])?;
            writer.write_all(&(value as u32).to_le_bytes())
        }
        _ => {
            writer.write_all(&[0xff])?;
            writer.write_all(&value.to_le_bytes())
        }
    }
}

/// Write bytes with a CompactSize length prefix
pub fn write_var_bytes<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    write_varint(writer, data.len() as u64)?;
    writer.write_all(data)
}

/// Little-endian reader over consensus-encoded bytes.
///
/// Every read is bounds checked; a truncated buffer yields [`Error::Decode`]
/// instead of panicking, since the bytes come straight from the upstream node.
pub struct Decoder<R> {
    reader: R,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| Error::Decode(format!("unexpected end of data: {}", e)))?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        match self.read_u8()? {
            0xfd => Ok(u16::from_le_bytes(self.read_array()?) as u64),
            0xfe => Ok(u32::from_le_bytes(self.read_array()?) as u64),
            0xff => self.read_u64(),
            n => Ok(n as u64),
        }
    }

    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_varint()? as usize;
        let mut data = Vec::new();
        // take() bounds the allocation by the bytes actually present
        (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut data)
            .map_err(|e| Error::Decode(e.to_string()))?;
        if data.len() != len {
            return Err(Error::Decode(format!(
                "truncated field: expected {} bytes, got {}",
                len,
                data.len()
            )));
        }
        Ok(data)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
