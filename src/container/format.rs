//! Binary format definitions for reel container files.

use std::io::{self, Read, Write};

/// Magic bytes identifying a reel container file.
pub const FILE_MAGIC: &[u8; 4] = b"EVX1";

/// Magic bytes opening every frame record.
pub const RECORD_MAGIC: &[u8; 4] = b"EVFH";

/// Current (and only supported) format version.
pub const FORMAT_VERSION: u8 = 1;

/// Errors raised when a header or record fails validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormatError {
    #[error("Invalid file magic {0:?}")]
    FileMagic([u8; 4]),
    #[error("Invalid record magic {0:?}")]
    RecordMagic([u8; 4]),
    #[error("Declared header size {found} does not match expected {expected}")]
    HeaderSize { expected: u32, found: u32 },
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),
    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f32),
    #[error("Expected frame index {expected}, found {found}")]
    UnexpectedFrameIndex { expected: u64, found: u64 },
}

/// Errors raised while reading or writing container data.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
    #[error("End of stream")]
    EndOfStream,
    #[error("Truncated record: needed {needed} bytes, got {available}")]
    TruncatedRecord { needed: usize, available: usize },
}

/// File header written once at the start of a container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileHeader {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame count hint (0 = unknown, read until end of file).
    pub frame_count: u64,
    /// Nominal frames per second.
    pub frame_rate: f32,
}

impl FileHeader {
    /// Size of header in bytes.
    /// Magic(4) + HeaderSize(4) + Version(1) + Width(4) + Height(4) +
    /// FrameCount(8) + FrameRate(4) + Reserved(3) = 32
    pub const SIZE: usize = 32;

    pub fn new(width: u32, height: u32, frame_count: u64, frame_rate: f32) -> Self {
        Self {
            width,
            height,
            frame_count,
            frame_rate,
        }
    }

    /// Reject headers that could not be read back.
    pub fn validate(&self) -> Result<(), FormatError> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(FormatError::InvalidFrameRate(self.frame_rate));
        }
        Ok(())
    }

    /// Serialize header into its fixed-size byte form.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(FILE_MAGIC);
        buf[4..8].copy_from_slice(&(Self::SIZE as u32).to_le_bytes());
        buf[8] = FORMAT_VERSION;
        buf[9..13].copy_from_slice(&self.width.to_le_bytes());
        buf[13..17].copy_from_slice(&self.height.to_le_bytes());
        buf[17..25].copy_from_slice(&self.frame_count.to_le_bytes());
        buf[25..29].copy_from_slice(&self.frame_rate.to_le_bytes());
        // 29..32 reserved, left zeroed
        buf
    }

    /// Write header to output.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    /// Parse and validate header bytes.
    pub fn validate_bytes(buf: &[u8; Self::SIZE]) -> Result<Self, FormatError> {
        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if &magic != FILE_MAGIC {
            return Err(FormatError::FileMagic(magic));
        }

        let header_size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if header_size != Self::SIZE as u32 {
            return Err(FormatError::HeaderSize {
                expected: Self::SIZE as u32,
                found: header_size,
            });
        }

        let version = buf[8];
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let width = u32::from_le_bytes([buf[9], buf[10], buf[11], buf[12]]);
        let height = u32::from_le_bytes([buf[13], buf[14], buf[15], buf[16]]);

        let mut count = [0u8; 8];
        count.copy_from_slice(&buf[17..25]);
        let frame_count = u64::from_le_bytes(count);

        let frame_rate = f32::from_le_bytes([buf[25], buf[26], buf[27], buf[28]]);

        let header = Self {
            width,
            height,
            frame_count,
            frame_rate,
        };
        header.validate()?;
        Ok(header)
    }

    /// Read and validate header from input.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, ContainerError> {
        let mut buf = [0u8; Self::SIZE];
        r.read_exact(&mut buf)?;
        Ok(Self::validate_bytes(&buf)?)
    }

    /// Log the header fields.
    pub fn log_fields(&self) {
        log::info!("Container header:");
        log::info!("  size = {}", Self::SIZE);
        log::info!("  version = {}", FORMAT_VERSION);
        log::info!("  width = {}", self.width);
        log::info!("  height = {}", self.height);
        log::info!("  frame count = {}", self.frame_count);
        log::info!("  rate = {:.3}", self.frame_rate);
    }
}

/// Header preceding each frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecordHeader {
    /// Zero-based position of the frame in the stream.
    pub index: u64,
    /// Payload bytes following the header.
    pub payload_size: u32,
}

impl FrameRecordHeader {
    /// Magic(4) + HeaderSize(4) + Index(8) + PayloadSize(4) = 20
    pub const SIZE: usize = 20;

    pub fn new(index: u64, payload_size: u32) -> Self {
        Self {
            index,
            payload_size,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(RECORD_MAGIC);
        buf[4..8].copy_from_slice(&(Self::SIZE as u32).to_le_bytes());
        buf[8..16].copy_from_slice(&self.index.to_le_bytes());
        buf[16..20].copy_from_slice(&self.payload_size.to_le_bytes());
        buf
    }

    pub fn validate_bytes(buf: &[u8; Self::SIZE]) -> Result<Self, FormatError> {
        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if &magic != RECORD_MAGIC {
            return Err(FormatError::RecordMagic(magic));
        }

        let header_size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if header_size != Self::SIZE as u32 {
            return Err(FormatError::HeaderSize {
                expected: Self::SIZE as u32,
                found: header_size,
            });
        }

        let mut index = [0u8; 8];
        index.copy_from_slice(&buf[8..16]);

        Ok(Self {
            index: u64::from_le_bytes(index),
            payload_size: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
        })
    }

    /// Total bytes this record occupies on disk.
    pub fn record_len(&self) -> u64 {
        Self::SIZE as u64 + self.payload_size as u64
    }
}

/// Write one frame record (header followed by payload).
pub fn write_frame_record<W: Write>(
    w: &mut W,
    index: u64,
    payload: &[u8],
) -> Result<FrameRecordHeader, ContainerError> {
    let payload_size = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Payload of {} bytes exceeds record limit", payload.len()),
        )
    })?;
    let header = FrameRecordHeader::new(index, payload_size);
    w.write_all(&header.to_bytes())?;
    w.write_all(payload)?;
    Ok(header)
}

/// Read one frame record, handing the payload bytes to `payload`.
///
/// Returns `EndOfStream` only when no bytes of a new record are available.
/// A partial header or a short payload is a `TruncatedRecord`.
pub fn read_frame_record<R: Read>(
    r: &mut R,
    payload: &mut Vec<u8>,
) -> Result<FrameRecordHeader, ContainerError> {
    let mut buf = [0u8; FrameRecordHeader::SIZE];
    let got = read_fully(r, &mut buf)?;
    if got == 0 {
        return Err(ContainerError::EndOfStream);
    }
    if got < buf.len() {
        return Err(ContainerError::TruncatedRecord {
            needed: buf.len(),
            available: got,
        });
    }

    let header = FrameRecordHeader::validate_bytes(&buf)?;
    let size = header.payload_size as usize;

    // Grow with the data actually read, never with the declared size.
    payload.clear();
    let got = r.by_ref().take(size as u64).read_to_end(payload)?;
    if got < size {
        return Err(ContainerError::TruncatedRecord {
            needed: size,
            available: got,
        });
    }

    Ok(header)
}

/// Fill `buf` as far as the reader allows, returning bytes read.
fn read_fully<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_header_roundtrip() {
        let header = FileHeader::new(64, 48, 1000, 29.97);

        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), FileHeader::SIZE);

        let mut cursor = Cursor::new(&buf);
        let decoded = FileHeader::read_from(&mut cursor).unwrap();

        assert_eq!(decoded.width, 64);
        assert_eq!(decoded.height, 48);
        assert_eq!(decoded.frame_count, 1000);
        assert!((decoded.frame_rate - 29.97).abs() < 1e-6);
    }

    #[test]
    fn test_zero_frame_rate_rejected() {
        let bytes = FileHeader::new(64, 64, 0, 0.0).to_bytes();
        assert_eq!(
            FileHeader::validate_bytes(&bytes),
            Err(FormatError::InvalidFrameRate(0.0))
        );
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = FileHeader::new(64, 64, 0, 30.0).to_bytes();
        bytes[3] = b'2';
        assert_eq!(
            FileHeader::validate_bytes(&bytes),
            Err(FormatError::FileMagic(*b"EVX2"))
        );
    }

    #[test]
    fn test_header_size_mismatch_rejected() {
        let mut bytes = FileHeader::new(64, 64, 0, 30.0).to_bytes();
        bytes[4..8].copy_from_slice(&34u32.to_le_bytes());
        assert!(matches!(
            FileHeader::validate_bytes(&bytes),
            Err(FormatError::HeaderSize { expected: 32, found: 34 })
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = FileHeader::new(64, 64, 0, 30.0).to_bytes();
        bytes[8] = 2;
        assert_eq!(
            FileHeader::validate_bytes(&bytes),
            Err(FormatError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn test_five_records_then_end_of_stream() {
        let sizes = [100usize, 120, 90, 110, 95];
        let mut buf = Vec::new();
        FileHeader::new(64, 64, 0, 30.0).write_to(&mut buf).unwrap();
        for (i, &size) in sizes.iter().enumerate() {
            let payload = vec![i as u8; size];
            write_frame_record(&mut buf, i as u64, &payload).unwrap();
        }

        let mut cursor = Cursor::new(&buf);
        let header = FileHeader::read_from(&mut cursor).unwrap();
        assert_eq!(header.frame_count, 0);

        let mut payload = Vec::new();
        let mut last = None;
        for (i, &size) in sizes.iter().enumerate() {
            let record = read_frame_record(&mut cursor, &mut payload).unwrap();
            assert_eq!(record.index, i as u64);
            assert_eq!(record.payload_size as usize, size);
            assert!(payload.iter().all(|&b| b == i as u8));
            last = Some(record.index);
        }
        assert_eq!(last, Some(4));

        assert!(matches!(
            read_frame_record(&mut cursor, &mut payload),
            Err(ContainerError::EndOfStream)
        ));
    }

    #[test]
    fn test_short_payload_is_truncated() {
        let mut buf = Vec::new();
        write_frame_record(&mut buf, 0, &[7u8; 64]).unwrap();
        buf.truncate(FrameRecordHeader::SIZE + 40);

        let mut payload = Vec::new();
        let err = read_frame_record(&mut Cursor::new(&buf), &mut payload).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::TruncatedRecord {
                needed: 64,
                available: 40
            }
        ));
    }

    #[test]
    fn test_overlong_payload_size_is_truncated() {
        let mut buf = FrameRecordHeader::new(0, u32::MAX).to_bytes().to_vec();
        buf.extend_from_slice(&[9u8; 10]);

        let mut payload = Vec::new();
        let err = read_frame_record(&mut Cursor::new(&buf), &mut payload).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::TruncatedRecord {
                needed,
                available: 10
            } if needed == u32::MAX as usize
        ));
        assert_eq!(payload.len(), 10);
        assert!(payload.capacity() < 1 << 20);
    }

    #[test]
    fn test_partial_record_header_is_truncated() {
        let mut buf = Vec::new();
        write_frame_record(&mut buf, 0, &[1, 2, 3]).unwrap();
        buf.truncate(7);

        let mut payload = Vec::new();
        let err = read_frame_record(&mut Cursor::new(&buf), &mut payload).unwrap_err();
        assert!(matches!(err, ContainerError::TruncatedRecord { .. }));
    }

    #[test]
    fn test_record_magic_checked() {
        let mut buf = Vec::new();
        write_frame_record(&mut buf, 0, &[1, 2, 3]).unwrap();
        buf[0] = b'X';

        let mut payload = Vec::new();
        let err = read_frame_record(&mut Cursor::new(&buf), &mut payload).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::Format(FormatError::RecordMagic(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_header_roundtrip(
            width in 1u32..=16384,
            height in 1u32..=16384,
            frame_count in any::<u64>(),
            frame_rate in 0.001f32..1000.0,
        ) {
            let header = FileHeader::new(width, height, frame_count, frame_rate);
            let decoded = FileHeader::validate_bytes(&header.to_bytes()).unwrap();
            prop_assert_eq!(decoded, header);
        }
    }
}
