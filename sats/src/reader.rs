//! Byte-level reader with bounded operations.

use crate::error::{DecodeError, DecodeResult};

/// A bounds-checked cursor over a byte slice.
///
/// All read operations validate availability and return errors on failure.
/// The reader never panics on malformed input.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a new `ByteReader` over a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the number of bytes remaining to read.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns `true` if there are no more bytes to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the current byte position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Reads `len` bytes as a slice borrowed from the input.
    pub fn read_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEof {
                requested: len,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads exactly `N` bytes into an array.
    pub fn read_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> DecodeResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `u128`.
    pub fn read_u128(&mut self) -> DecodeResult<u128> {
        Ok(u128::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `i8`.
    pub fn read_i8(&mut self) -> DecodeResult<i8> {
        #[allow(clippy::cast_possible_wrap)]
        Ok(self.read_u8()? as i8)
    }

    /// Reads a little-endian `i16`.
    pub fn read_i16(&mut self) -> DecodeResult<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&mut self) -> DecodeResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `i64`.
    pub fn read_i64(&mut self) -> DecodeResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `i128`.
    pub fn read_i128(&mut self) -> DecodeResult<i128> {
        Ok(i128::from_le_bytes(self.read_array()?))
    }

    /// Reads a `u32` length prefix as a `usize`.
    pub fn read_len(&mut self) -> DecodeResult<usize> {
        Ok(self.read_u32()? as usize)
    }
}
