//! Codec module - Frame compression behind the [`FrameCodec`] trait.
//!
//! Pipelines only see the trait. [`BlockCodec`] is the built-in
//! implementation: a 16x16 block codec with intra DC and half-pel motion
//! compensated prediction, adaptive quantization and Exp-Golomb residuals.

mod bits;
mod block;

pub use block::{BLOCK_SIZE, BlockCodec, BlockInfo, BlockMode, MAX_QUALITY};

use serde::{Deserialize, Serialize};

use crate::buffer::{BufferError, PixelBuffer, StagingBuffer};

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("Frame is {found_width}x{found_height}, codec expects {width}x{height}")]
    DimensionMismatch {
        width: usize,
        height: usize,
        found_width: usize,
        found_height: usize,
    },
    #[error("Quality {level} out of range (max {max})")]
    InvalidQuality { level: u8, max: u8 },
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// Internal codec artifact that can be rendered in place of the output image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    /// The frame handed to the encoder.
    Source,
    /// Per-block prediction before residuals are added.
    Prediction,
    /// Block grid colored by coding mode.
    BlockTable,
    /// Per-block quantizer step.
    QuantTable,
    /// Per-block sub-pixel motion vectors.
    MotionTable,
    /// Per-block luma variance.
    Variance,
    /// Fully reconstructed frame.
    #[default]
    Output,
}

impl View {
    pub const ALL: [View; 7] = [
        View::Source,
        View::Prediction,
        View::BlockTable,
        View::QuantTable,
        View::MotionTable,
        View::Variance,
        View::Output,
    ];

    /// Human readable name, used as the window title.
    pub fn name(self) -> &'static str {
        match self {
            View::Source => "Source",
            View::Prediction => "Prediction",
            View::BlockTable => "Block table",
            View::QuantTable => "Quantization table",
            View::MotionTable => "Sub-pixel motion table",
            View::Variance => "Variance",
            View::Output => "Output",
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Compressor/decompressor collaborator.
///
/// `encode` consumes a raw frame and leaves the compressed payload in the
/// staging buffer. `decode` consumes a staged payload and writes the
/// reconstructed frame. Both sides keep internal reference state, so frames
/// must be fed in stream order.
pub trait FrameCodec {
    /// Set the quality level used by subsequent `encode` calls.
    fn set_quality(&mut self, level: u8) -> Result<(), CodecError>;

    /// Current quality level.
    fn quality(&self) -> u8;

    /// Compress `pixels`, appending the payload to `staging`.
    fn encode(&mut self, pixels: &PixelBuffer, staging: &mut StagingBuffer)
    -> Result<(), CodecError>;

    /// Decompress the payload in `staging` into `pixels`.
    fn decode(
        &mut self,
        staging: &mut StagingBuffer,
        pixels: &mut PixelBuffer,
    ) -> Result<(), CodecError>;

    /// Render an internal artifact of the most recent frame into `out`.
    fn peek(&self, view: View, out: &mut PixelBuffer) -> Result<(), CodecError>;
}
