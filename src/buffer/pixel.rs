//! RGB pixel buffer with configurable row pitch.

use serde::{Deserialize, Serialize};

use super::BufferError;

/// Vertical order of rows in a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// First row in memory is the top of the image.
    #[default]
    TopDown,
    /// First row in memory is the bottom of the image.
    BottomUp,
}

/// Row-major RGB24 image, one byte per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: usize,
    height: usize,
    row_pitch: usize,
}

impl PixelBuffer {
    /// Bytes per pixel.
    pub const CHANNELS: usize = 3;

    /// Allocate a tightly packed buffer.
    pub fn new(width: usize, height: usize) -> Result<Self, BufferError> {
        Self::with_row_pitch(width, height, Self::packed_pitch(width, height)?)
    }

    /// `width * CHANNELS`, or `InvalidDimensions` on overflow.
    fn packed_pitch(width: usize, height: usize) -> Result<usize, BufferError> {
        width
            .checked_mul(Self::CHANNELS)
            .ok_or(BufferError::InvalidDimensions { width, height })
    }

    /// Allocate a buffer whose rows start `row_pitch` bytes apart.
    pub fn with_row_pitch(
        width: usize,
        height: usize,
        row_pitch: usize,
    ) -> Result<Self, BufferError> {
        if width == 0 || height == 0 {
            return Err(BufferError::InvalidDimensions { width, height });
        }
        let min = Self::packed_pitch(width, height)?;
        if row_pitch < min {
            return Err(BufferError::InvalidPitch {
                pitch: row_pitch,
                min,
            });
        }

        let bytes = row_pitch
            .checked_mul(height)
            .ok_or(BufferError::InvalidDimensions { width, height })?;
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| BufferError::Allocation { bytes })?;
        data.resize(bytes, 0);

        Ok(Self {
            data,
            width,
            height,
            row_pitch,
        })
    }

    /// Allocate with the row pitch rounded up to a multiple of `alignment`.
    pub fn with_alignment(
        width: usize,
        height: usize,
        alignment: usize,
    ) -> Result<Self, BufferError> {
        let packed = Self::packed_pitch(width, height)?;
        let alignment = alignment.max(1);
        let pitch = packed
            .div_ceil(alignment)
            .checked_mul(alignment)
            .ok_or(BufferError::InvalidDimensions { width, height })?;
        Self::with_row_pitch(width, height, pitch)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn row_pitch(&self) -> usize {
        self.row_pitch
    }

    /// Size of the tightly packed image in bytes.
    #[inline]
    pub fn packed_len(&self) -> usize {
        self.width * self.height * Self::CHANNELS
    }

    /// Raw storage including row padding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel bytes of row `y` (padding excluded).
    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.row_pitch;
        &self.data[start..start + self.width * Self::CHANNELS]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.row_pitch;
        &mut self.data[start..start + self.width * Self::CHANNELS]
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [u8; 3] {
        let i = y * self.row_pitch + x * Self::CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
        let i = y * self.row_pitch + x * Self::CHANNELS;
        self.data[i..i + 3].copy_from_slice(&rgb);
    }

    /// Set every pixel to `rgb`.
    pub fn fill(&mut self, rgb: [u8; 3]) {
        for y in 0..self.height {
            for px in self.row_mut(y).chunks_exact_mut(Self::CHANNELS) {
                px.copy_from_slice(&rgb);
            }
        }
    }

    /// Copy a source image, flipping it if the source is stored bottom-up so
    /// that row 0 of this buffer is always the top of the picture.
    pub fn copy_from(
        &mut self,
        src: &[u8],
        src_pitch: usize,
        order: RowOrder,
    ) -> Result<(), BufferError> {
        let row_len = self.width * Self::CHANNELS;
        if src_pitch < row_len {
            return Err(BufferError::InvalidPitch {
                pitch: src_pitch,
                min: row_len,
            });
        }
        let needed = src_pitch
            .checked_mul(self.height - 1)
            .and_then(|n| n.checked_add(row_len))
            .ok_or(BufferError::InvalidPitch {
                pitch: src_pitch,
                min: row_len,
            })?;
        if src.len() < needed {
            return Err(BufferError::SourceTooSmall {
                needed,
                available: src.len(),
            });
        }

        for y in 0..self.height {
            let src_y = match order {
                RowOrder::TopDown => y,
                RowOrder::BottomUp => self.height - 1 - y,
            };
            let start = src_y * src_pitch;
            self.row_mut(y).copy_from_slice(&src[start..start + row_len]);
        }
        Ok(())
    }

    /// Copy all pixels from another buffer of the same dimensions.
    pub fn copy_pixels(&mut self, other: &PixelBuffer) -> Result<(), BufferError> {
        if other.width != self.width || other.height != self.height {
            return Err(BufferError::InvalidDimensions {
                width: other.width,
                height: other.height,
            });
        }
        for y in 0..self.height {
            self.row_mut(y).copy_from_slice(other.row(y));
        }
        Ok(())
    }

    /// Tightly packed copy of the image (no row padding).
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.packed_len());
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }
}
