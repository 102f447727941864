//! Buffer module - Memory shared between pipeline stages.
//!
//! A [`FrameBridge`] owns the raw RGB image of the current frame and the
//! staging buffer holding that frame's compressed payload. It never performs
//! file I/O itself.

mod pixel;
mod staging;

pub use pixel::{PixelBuffer, RowOrder};
pub use staging::StagingBuffer;

use crate::schema::BufferConfig;

/// Errors raised by buffer management.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("Staging buffer capacity exceeded: need {needed} bytes, cap is {cap}")]
    CapacityExceeded { needed: usize, cap: usize },
    #[error("Failed to allocate {bytes} bytes")]
    Allocation { bytes: usize },
    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("Row pitch {pitch} is smaller than the minimum {min}")]
    InvalidPitch { pitch: usize, min: usize },
    #[error("Source image too small: need {needed} bytes, got {available}")]
    SourceTooSmall { needed: usize, available: usize },
    #[error("Read past end of staged data: requested {requested} bits, {remaining} remaining")]
    Underflow { requested: usize, remaining: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One pixel buffer and one staging buffer for a single active pipeline.
#[derive(Debug, Clone)]
pub struct FrameBridge {
    pub pixels: PixelBuffer,
    pub staging: StagingBuffer,
}

impl FrameBridge {
    /// Allocate both buffers for frames of `width` x `height`.
    pub fn new(width: usize, height: usize, config: &BufferConfig) -> Result<Self, BufferError> {
        let pixels = PixelBuffer::with_alignment(width, height, config.row_alignment)?;
        let staging = StagingBuffer::with_capacity(config.staging_capacity)?
            .with_hard_cap(config.staging_hard_cap);

        log::debug!(
            "Allocated frame bridge: {}x{} (pitch {}), staging {} bytes",
            width,
            height,
            pixels.row_pitch(),
            config.staging_capacity
        );

        Ok(Self { pixels, staging })
    }

    /// Empty the staging buffer ahead of the next frame.
    pub fn reset(&mut self) {
        self.staging.reset();
    }

    /// Bytes currently staged.
    pub fn occupancy(&self) -> usize {
        self.staging.occupancy()
    }

    /// Stage payload bytes.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        self.staging.append(bytes)
    }
}
