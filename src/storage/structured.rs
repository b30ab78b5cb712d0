//! Structured binary reading and writing.
//!
//! [`StructWriter`] builds a little-endian byte buffer; [`StructReader`] walks
//! one back. Strings and byte blobs are length-prefixed with a varint.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{QuarryError, Result};
use crate::util::varint;

/// Append-only writer over an in-memory buffer.
#[derive(Debug, Default)]
pub struct StructWriter {
    buffer: Vec<u8>,
}

impl StructWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        StructWriter {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Current write offset.
    pub fn position(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.buffer.write_u8(value)?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.buffer.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.buffer.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.buffer.write_i64::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.buffer.write_f64::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        varint::write_u64(&mut self.buffer, value);
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write a varint length followed by the bytes.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.buffer.extend_from_slice(value);
        Ok(())
    }

    /// Write bytes without a length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(value);
        Ok(())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

/// Cursor-based reader over a borrowed buffer.
///
/// Reading past the end fails with an `UnexpectedEof` I/O error, which
/// callers parsing file content turn into a corruption error.
#[derive(Debug)]
pub struct StructReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> StructReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        StructReader {
            cursor: Cursor::new(data),
        }
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn seek(&mut self, position: u64) {
        self.cursor.set_position(position);
    }

    pub fn remaining(&self) -> usize {
        let data = *self.cursor.get_ref();
        data.len().saturating_sub(self.cursor.position() as usize)
    }

    pub fn is_eof(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.cursor.read_u8()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.cursor.read_u32::<LittleEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.cursor.read_u64::<LittleEndian>()?)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.cursor.read_i64::<LittleEndian>()?)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(self.cursor.read_f64::<LittleEndian>()?)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let data = *self.cursor.get_ref();
        let start = (self.cursor.position() as usize).min(data.len());
        let (value, consumed) = varint::decode_u64(&data[start..])?;
        self.cursor.set_position((start + consumed) as u64);
        Ok(value)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| QuarryError::index(format!("invalid UTF-8 in stored string: {e}")))
    }

    /// Read a varint length followed by that many bytes.
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        self.read_raw(len)
    }

    /// Read exactly `len` bytes without a length prefix.
    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(QuarryError::index(format!(
                "read of {len} bytes past end of buffer ({} remaining)",
                self.remaining()
            )));
        }
        let data: &'a [u8] = *self.cursor.get_ref();
        let start = self.cursor.position() as usize;
        self.cursor.set_position((start + len) as u64);
        Ok(&data[start..start + len])
    }
}
