//! Bit-addressed staging buffer holding one compressed frame.

use std::io::Read;

use super::BufferError;

/// Growable byte buffer with independent bit-level write and read cursors.
///
/// Bits are packed most-significant first. The buffer holds at most one
/// frame's payload at a time and is reset between frames.
#[derive(Debug, Clone, Default)]
pub struct StagingBuffer {
    data: Vec<u8>,
    write_bits: usize,
    read_bits: usize,
    hard_cap: Option<usize>,
}

impl StagingBuffer {
    /// Create a buffer pre-sized to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| BufferError::Allocation { bytes: capacity })?;
        Ok(Self {
            data,
            write_bits: 0,
            read_bits: 0,
            hard_cap: None,
        })
    }

    /// Refuse to grow past `cap` bytes.
    pub fn with_hard_cap(mut self, cap: Option<usize>) -> Self {
        self.hard_cap = cap;
        self
    }

    /// Drop all staged data without releasing the allocation.
    pub fn reset(&mut self) {
        self.data.clear();
        self.write_bits = 0;
        self.read_bits = 0;
    }

    /// Bytes currently staged (a partial trailing byte counts as one).
    #[inline]
    pub fn occupancy(&self) -> usize {
        self.write_bits.div_ceil(8)
    }

    /// Bits currently staged.
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.write_bits
    }

    /// Bits not yet consumed by the read cursor.
    #[inline]
    pub fn bits_remaining(&self) -> usize {
        self.write_bits.saturating_sub(self.read_bits)
    }

    pub fn is_empty(&self) -> bool {
        self.write_bits == 0
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Staged bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.occupancy()]
    }

    /// Append whole bytes, padding the write cursor to a byte boundary first.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        self.align_writer();
        self.reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        self.write_bits += bytes.len() * 8;
        Ok(())
    }

    /// Append `len` bytes read from `r`.
    pub fn fill_from<R: Read>(&mut self, r: &mut R, len: usize) -> Result<(), BufferError> {
        self.align_writer();
        self.reserve(len)?;
        let start = self.data.len();
        self.data.resize(start + len, 0);
        if let Err(e) = r.read_exact(&mut self.data[start..]) {
            self.data.truncate(start);
            return Err(BufferError::Io(e));
        }
        self.write_bits += len * 8;
        Ok(())
    }

    /// Write the low `count` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, count: u32) -> Result<(), BufferError> {
        debug_assert!(count <= 32);
        let end_bits = self.write_bits + count as usize;
        let needed = end_bits.div_ceil(8);
        if needed > self.data.len() {
            self.reserve(needed - self.data.len())?;
            self.data.resize(needed, 0);
        }

        for i in (0..count).rev() {
            let bit = ((value >> i) & 1) as u8;
            let byte = self.write_bits / 8;
            let shift = 7 - (self.write_bits % 8);
            if bit == 1 {
                self.data[byte] |= 1 << shift;
            } else {
                self.data[byte] &= !(1 << shift);
            }
            self.write_bits += 1;
        }
        Ok(())
    }

    /// Write a single flag bit.
    pub fn write_bit(&mut self, bit: bool) -> Result<(), BufferError> {
        self.write_bits(bit as u32, 1)
    }

    /// Read `count` bits, most significant first.
    pub fn read_bits(&mut self, count: u32) -> Result<u32, BufferError> {
        debug_assert!(count <= 32);
        if self.bits_remaining() < count as usize {
            return Err(BufferError::Underflow {
                requested: count as usize,
                remaining: self.bits_remaining(),
            });
        }

        let mut value = 0u32;
        for _ in 0..count {
            let byte = self.data[self.read_bits / 8];
            let bit = (byte >> (7 - (self.read_bits % 8))) & 1;
            value = (value << 1) | bit as u32;
            self.read_bits += 1;
        }
        Ok(value)
    }

    pub fn read_bit(&mut self) -> Result<bool, BufferError> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Advance the write cursor to the next byte boundary.
    pub fn align_writer(&mut self) {
        self.write_bits = self.write_bits.div_ceil(8) * 8;
    }

    /// Advance the read cursor to the next byte boundary.
    pub fn align_reader(&mut self) {
        self.read_bits = self.read_bits.div_ceil(8) * 8;
    }

    /// Rewind the read cursor to the start of the staged data.
    pub fn rewind(&mut self) {
        self.read_bits = 0;
    }

    fn reserve(&mut self, additional: usize) -> Result<(), BufferError> {
        let needed = self.data.len() + additional;
        if let Some(cap) = self.hard_cap
            && needed > cap
        {
            return Err(BufferError::CapacityExceeded { needed, cap });
        }
        if needed > self.data.capacity() {
            log::debug!(
                "Staging buffer growing from {} to at least {} bytes",
                self.data.capacity(),
                needed
            );
            self.data
                .try_reserve(additional)
                .map_err(|_| BufferError::Allocation { bytes: needed })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_bits_roundtrip() {
        let mut buf = StagingBuffer::with_capacity(16).unwrap();
        buf.write_bits(0b101, 3).unwrap();
        buf.write_bits(0xABCD, 16).unwrap();
        buf.write_bit(true).unwrap();
        assert_eq!(buf.bit_len(), 20);
        assert_eq!(buf.occupancy(), 3);

        assert_eq!(buf.read_bits(3).unwrap(), 0b101);
        assert_eq!(buf.read_bits(16).unwrap(), 0xABCD);
        assert!(buf.read_bit().unwrap());
        assert!(matches!(
            buf.read_bits(1),
            Err(BufferError::Underflow { .. })
        ));
    }

    #[test]
    fn test_reset_keeps_allocation() {
        let mut buf = StagingBuffer::with_capacity(1024).unwrap();
        buf.append(&[1, 2, 3, 4]).unwrap();
        assert_eq!(buf.occupancy(), 4);

        buf.reset();
        assert_eq!(buf.occupancy(), 0);
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 1024);
    }

    #[test]
    fn test_append_aligns_partial_byte() {
        let mut buf = StagingBuffer::with_capacity(8).unwrap();
        buf.write_bits(1, 1).unwrap();
        buf.append(&[0xFF]).unwrap();
        assert_eq!(buf.as_bytes(), &[0x80, 0xFF]);
    }

    #[test]
    fn test_grows_without_hard_cap() {
        let mut buf = StagingBuffer::with_capacity(4).unwrap();
        buf.append(&[7u8; 64]).unwrap();
        assert_eq!(buf.occupancy(), 64);
    }

    #[test]
    fn test_hard_cap_enforced() {
        let mut buf = StagingBuffer::with_capacity(4).unwrap().with_hard_cap(Some(8));
        buf.append(&[0u8; 8]).unwrap();
        assert!(matches!(
            buf.append(&[0u8; 1]),
            Err(BufferError::CapacityExceeded { needed: 9, cap: 8 })
        ));
        assert!(matches!(
            buf.write_bits(1, 1),
            Err(BufferError::CapacityExceeded { .. })
        ));
        assert_eq!(buf.occupancy(), 8);
    }

    #[test]
    fn test_fill_from_short_reader() {
        let mut buf = StagingBuffer::with_capacity(16).unwrap();
        let mut src = Cursor::new(vec![1u8, 2, 3]);
        assert!(matches!(
            buf.fill_from(&mut src, 5),
            Err(BufferError::Io(_))
        ));
        assert_eq!(buf.occupancy(), 0);

        let mut src = Cursor::new(vec![1u8, 2, 3]);
        buf.fill_from(&mut src, 3).unwrap();
        assert_eq!(buf.as_bytes(), &[1, 2, 3]);
    }
}
