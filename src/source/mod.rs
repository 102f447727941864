//! Source module - Decoded frame producers behind the [`FrameSource`] trait.

mod ffmpeg;
mod synthetic;

pub use ffmpeg::{FfmpegSource, parse_frame_rate};
pub use synthetic::{SyntheticConfig, SyntheticSource};

use std::io;
use std::path::PathBuf;

use crate::buffer::RowOrder;

/// Error type for source decoders.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to open {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("Failed to probe {path}: {reason}")]
    Probe { path: PathBuf, reason: String },
    #[error("Failed to start decoder: {0}")]
    Spawn(io::Error),
    #[error("Invalid source description '{0}'")]
    InvalidInput(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Stream properties reported when a source is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub width: usize,
    pub height: usize,
    /// Native pixel format of the underlying stream, informational only.
    pub pixel_format: String,
    /// Number of frames if known, 0 otherwise.
    pub frame_count_hint: u64,
    /// Nominal frames per second.
    pub frame_rate: f32,
    /// Row order of the RGB frames this source yields.
    pub row_order: RowOrder,
}

/// One decoded RGB24 frame, borrowed from the source.
#[derive(Debug, Clone, Copy)]
pub struct SourceFrame<'a> {
    pub pixels: &'a [u8],
    /// Distance in bytes between consecutive rows.
    pub row_pitch: usize,
    /// Size of the compressed packet this frame was decoded from, if known.
    pub encoded_size: Option<usize>,
}

/// Source decoder collaborator.
///
/// `next_frame` returns `Ok(None)` when the stream is exhausted. `close`
/// releases decoder resources and must be safe to call more than once.
pub trait FrameSource {
    fn info(&self) -> &SourceInfo;

    fn next_frame(&mut self) -> Result<Option<SourceFrame<'_>>, SourceError>;

    fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> &SourceInfo {
        (**self).info()
    }

    fn next_frame(&mut self) -> Result<Option<SourceFrame<'_>>, SourceError> {
        (**self).next_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Open a source from a command line input argument.
///
/// `synthetic:WxH:N[@FPS]` selects the built-in test pattern; anything else is
/// treated as a media file path decoded with ffmpeg.
pub fn open_source(input: &str) -> Result<Box<dyn FrameSource>, SourceError> {
    match input.strip_prefix("synthetic:") {
        Some(params) => Ok(Box::new(SyntheticSource::new(SyntheticConfig::parse(params)?))),
        None => Ok(Box::new(FfmpegSource::open(input)?)),
    }
}
