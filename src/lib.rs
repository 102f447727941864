//! Framereel - Streaming compressed-frame container with transcode and
//! playback pipelines.
//!
//! Raw RGB frames from a decoder are compressed one at a time and appended to
//! a length-prefixed container file. The file can later be played back at an
//! adjustable rate, or a source can be inspected live through the codec's
//! internal views.
//!
//! # Architecture
//!
//! - `container`: File header and frame record format, reader and writer
//! - `buffer`: Pixel and bit-addressed staging buffers shared by the stages
//! - `codec`: The [`FrameCodec`] trait and the built-in [`BlockCodec`]
//! - `source`: The [`FrameSource`] trait with ffmpeg and synthetic decoders
//! - `transcode`: Source to container pipeline
//! - `playback`: Tick-driven playback and inspect sessions, rate clock, host
//! - `schema`: Tool configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use framereel::{
//!     BlockCodec, PlaybackSession, Transcoder,
//!     playback::Session,
//!     schema::{PlaybackConfig, TranscodeConfig},
//!     source::{SyntheticConfig, SyntheticSource},
//! };
//! use std::time::Duration;
//!
//! let mut source = SyntheticSource::new(SyntheticConfig::default());
//! let mut codec = BlockCodec::new(320, 240)?;
//! let stats = Transcoder::new(TranscodeConfig::default())
//!     .run_to_path(&mut source, &mut codec, "clip.evx")?;
//! println!("{stats}");
//!
//! let mut session = PlaybackSession::open("clip.evx", &PlaybackConfig::default())?;
//! session.tick(Duration::from_millis(40))?;
//! # Ok::<(), framereel::Error>(())
//! ```

pub mod buffer;
pub mod codec;
pub mod container;
pub mod error;
pub mod playback;
pub mod schema;
pub mod source;
pub mod transcode;

// Re-export commonly used types
pub use buffer::{FrameBridge, PixelBuffer, RowOrder, StagingBuffer};
pub use codec::{BlockCodec, FrameCodec, View};
pub use container::{ContainerReader, ContainerWriter, FileHeader, FrameRecordHeader};
pub use error::{Error, Result};
pub use playback::{Command, InspectSession, PlaybackSession};
pub use schema::ToolConfig;
pub use source::{FrameSource, SourceInfo};
pub use transcode::{TranscodeStats, Transcoder};
