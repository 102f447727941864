//! Container writer for appending compressed frame records.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::format::{ContainerError, FileHeader, FrameRecordHeader, write_frame_record};

/// Sequential writer producing a container file.
///
/// Usage:
/// ```ignore
/// let header = FileHeader::new(640, 480, 0, 30.0);
/// let mut writer = ContainerWriter::create("clip.evx", header)?;
/// for payload in payloads {
///     writer.write_frame(&payload)?;
/// }
/// let stats = writer.finish()?;
/// ```
pub struct ContainerWriter<W: Write = BufWriter<File>> {
    writer: W,
    header: FileHeader,
    frames_written: u64,
    bytes_written: u64,
}

impl ContainerWriter<BufWriter<File>> {
    /// Create the destination file and write the header.
    pub fn create<P: AsRef<Path>>(path: P, header: FileHeader) -> Result<Self, ContainerError> {
        header.validate()?;
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), header)
    }
}

impl<W: Write> ContainerWriter<W> {
    /// Wrap an arbitrary output, writing the header immediately.
    pub fn new(mut writer: W, header: FileHeader) -> Result<Self, ContainerError> {
        header.validate()?;
        header.write_to(&mut writer)?;
        header.log_fields();

        Ok(Self {
            writer,
            header,
            frames_written: 0,
            bytes_written: FileHeader::SIZE as u64,
        })
    }

    /// Header written at the start of the file.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Append one frame record. Indices are assigned sequentially from 0.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<FrameRecordHeader, ContainerError> {
        let record = write_frame_record(&mut self.writer, self.frames_written, payload)?;
        self.frames_written += 1;
        self.bytes_written += record.record_len();
        Ok(record)
    }

    /// Number of records written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush buffered output and return the underlying writer with stats.
    pub fn finish(mut self) -> Result<(W, ContainerStats), ContainerError> {
        self.writer.flush()?;

        let payload_bytes = self
            .bytes_written
            .saturating_sub(FileHeader::SIZE as u64)
            .saturating_sub(self.frames_written * FrameRecordHeader::SIZE as u64);

        let stats = ContainerStats {
            frame_count: self.frames_written,
            total_bytes: self.bytes_written,
            average_frame_size: if self.frames_written > 0 {
                payload_bytes / self.frames_written
            } else {
                0
            },
        };
        Ok((self.writer, stats))
    }
}

/// Statistics from a writing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStats {
    /// Total frames written.
    pub frame_count: u64,
    /// Total file size in bytes.
    pub total_bytes: u64,
    /// Average compressed payload size.
    pub average_frame_size: u64,
}

impl std::fmt::Display for ContainerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} bytes total, {} bytes/frame avg",
            self.frame_count, self.total_bytes, self.average_frame_size
        )
    }
}
