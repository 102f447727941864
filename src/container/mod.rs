//! Container format for streams of compressed video frames.
//!
//! A container is one fixed-size file header followed by zero or more frame
//! records, each a fixed-size record header plus a variable-length payload.
//! There is no index and no end marker: end of file is end of stream.
//!
//! # File Format
//!
//! All fields are little-endian with no padding.
//!
//! ```text
//! File header (32 bytes):
//!   Magic: "EVX1" (4 bytes)
//!   Header size: u32 (= 32)
//!   Version: u8 (= 1)
//!   Width: u32
//!   Height: u32
//!   Frame count: u64 (hint, 0 = unknown)
//!   Frame rate: f32 (must be > 0)
//!   Reserved: 3 bytes
//!
//! Frame record header (20 bytes):
//!   Magic: "EVFH" (4 bytes)
//!   Header size: u32 (= 20)
//!   Frame index: u64 (0, 1, 2, ... with no gaps)
//!   Payload size: u32
//!
//! Payload (payload size bytes), immediately followed by the next record.
//! ```

mod format;
mod reader;
mod writer;

pub use format::{
    ContainerError, FILE_MAGIC, FORMAT_VERSION, FileHeader, FormatError, FrameRecordHeader,
    RECORD_MAGIC, read_frame_record, write_frame_record,
};
pub use reader::{ContainerReader, RecordIterator};
pub use writer::{ContainerStats, ContainerWriter};
