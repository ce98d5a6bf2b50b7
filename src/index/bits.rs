//! Growable bit buffer used for the bit-packed index streams.
//!
//! Bits are stored least significant bit first within each byte. Integer
//! values are written least significant bit first as well.

use super::Error;

/// A sequence of bits backed by a byte vector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BitBuffer {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitBuffer {
    /// Zero-filled buffer of `bit_len` bits.
    pub fn new(bit_len: usize) -> Self {
        Self {
            bytes: vec![0; bit_len.div_ceil(8)],
            bit_len,
        }
    }

    /// Wrap existing bytes.
    ///
    /// # Errors
    ///
    /// Fails if `bytes` holds fewer than `bit_len` bits.
    pub fn from_bytes(bytes: Vec<u8>, bit_len: usize) -> Result<Self, Error> {
        if bytes.len() * 8 < bit_len {
            return Err(Error::OutOfBounds {
                offset: 0,
                length: bit_len,
                bits: bytes.len() * 8,
            });
        }
        Ok(Self { bytes, bit_len })
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn check(&self, offset: usize, length: usize) -> Result<(), Error> {
        if length > 32 || offset + length > self.bit_len {
            Err(Error::OutOfBounds {
                offset,
                length,
                bits: self.bit_len,
            })
        } else {
            Ok(())
        }
    }

    pub fn get_bit(&self, index: usize) -> Result<bool, Error> {
        self.check(index, 1)?;
        Ok(self.bytes[index / 8] & (1 << (index % 8)) != 0)
    }

    /// Read `length` (at most 32) bits starting at `offset` as an integer.
    pub fn read(&self, offset: usize, length: usize) -> Result<u32, Error> {
        self.check(offset, length)?;
        let mut value = 0u32;
        for i in 0..length {
            let bit = offset + i;
            if self.bytes[bit / 8] & (1 << (bit % 8)) != 0 {
                value |= 1 << i;
            }
        }
        Ok(value)
    }

    /// Overwrite `length` (at most 32) bits starting at `offset` with `value`.
    pub fn write(&mut self, offset: usize, length: usize, value: u32) -> Result<(), Error> {
        self.check(offset, length)?;
        for i in 0..length {
            let bit = offset + i;
            let mask = 1u8 << (bit % 8);
            if value & (1 << i) != 0 {
                self.bytes[bit / 8] |= mask;
            } else {
                self.bytes[bit / 8] &= !mask;
            }
        }
        Ok(())
    }

    /// Append `length` (at most 32) bits of `value`.
    pub fn push(&mut self, value: u32, length: usize) -> Result<(), Error> {
        let offset = self.bit_len;
        self.bit_len += length;
        self.bytes.resize(self.bit_len.div_ceil(8), 0);
        self.write(offset, length, value)
    }

    /// Append all bits of `other`.
    pub fn append(&mut self, other: &BitBuffer) -> Result<(), Error> {
        let mut offset = 0;
        while offset < other.bit_len {
            let length = (other.bit_len - offset).min(32);
            self.push(other.read(offset, length)?, length)?;
            offset += length;
        }
        Ok(())
    }

    /// Copy of the bits in `[offset, offset + length)`.
    pub fn slice(&self, offset: usize, length: usize) -> Result<BitBuffer, Error> {
        if offset + length > self.bit_len {
            return Err(Error::OutOfBounds {
                offset,
                length,
                bits: self.bit_len,
            });
        }
        let mut result = BitBuffer::default();
        let mut pos = 0;
        while pos < length {
            let chunk = (length - pos).min(32);
            result.push(self.read(offset + pos, chunk)?, chunk)?;
            pos += chunk;
        }
        Ok(result)
    }
}
