//! A read cursor over an in-memory byte buffer for the wire codec.
//!
//! The codec never suspends (§5): a full frame is always fully buffered
//! before decoding starts, so this is a plain slice cursor rather than an
//! async reader.

use crate::error::WireError;

/// Cursor over a byte slice tracking the current read position.
pub struct WireCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireCursor<'a> {
    /// Wrap a byte slice for sequential decoding.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take `n` raw bytes, advancing the cursor.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                expected: n,
                actual: self.remaining(),
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..start + n])
    }

    /// Take exactly 3 bytes and interpret them as an ASCII type tag.
    pub fn take_tag(&mut self) -> Result<[u8; 3], WireError> {
        let bytes = self.take(3)?;
        Ok([bytes[0], bytes[1], bytes[2]])
    }

    /// Read a single raw byte.
    pub fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian u32.
    pub fn u32_be(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian i32.
    pub fn i32_be(&mut self) -> Result<i32, WireError> {
        Ok(self.u32_be()? as i32)
    }
}
