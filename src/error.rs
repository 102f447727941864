//! Crate-wide error type.

use crate::buffer::BufferError;
use crate::codec::CodecError;
use crate::container::ContainerError;
use crate::schema::ConfigError;
use crate::source::SourceError;

/// Any failure surfaced by the transcode, playback or inspect pipelines.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Frame dump failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
