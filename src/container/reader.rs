//! Container reader for sequential playback of frame records.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::format::{
    ContainerError, FileHeader, FormatError, FrameRecordHeader, read_frame_record,
};

/// Sequential reader over a container file.
///
/// Usage:
/// ```ignore
/// let mut reader = ContainerReader::open("clip.evx")?;
/// while !reader.is_exhausted() {
///     let (record, payload) = reader.next_record()?;
///     // Decode payload...
/// }
/// ```
pub struct ContainerReader<R: Read = BufReader<File>> {
    reader: R,
    header: FileHeader,
    /// Bytes consumed from the start of the stream, header included.
    position: u64,
    /// Total stream length in bytes.
    total_len: u64,
    frames_read: u64,
    /// Pre-allocated payload buffer.
    payload: Vec<u8>,
}

impl ContainerReader<BufReader<File>> {
    /// Open a container file and validate its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ContainerError> {
        let file = File::open(path)?;
        let total_len = file.metadata()?.len();
        Self::new(BufReader::new(file), total_len)
    }
}

impl<R: Read> ContainerReader<R> {
    /// Wrap a stream of `total_len` bytes, reading and validating the header.
    pub fn new(mut reader: R, total_len: u64) -> Result<Self, ContainerError> {
        let header = FileHeader::read_from(&mut reader)?;
        header.log_fields();

        Ok(Self {
            reader,
            header,
            position: FileHeader::SIZE as u64,
            total_len,
            frames_read: 0,
            payload: Vec::new(),
        })
    }

    /// Get container header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total stream length in bytes.
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Number of records read.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Fraction of the stream consumed, in [0, 1].
    pub fn progress(&self) -> f32 {
        if self.total_len == 0 {
            return 1.0;
        }
        (self.position as f64 / self.total_len as f64).min(1.0) as f32
    }

    /// True once the byte position reaches the stream length, or the declared
    /// frame count (if any) has been read.
    pub fn is_exhausted(&self) -> bool {
        if self.header.frame_count > 0 && self.frames_read >= self.header.frame_count {
            return true;
        }
        self.position >= self.total_len
    }

    /// Read the next record. The returned payload borrows the reader's buffer.
    pub fn next_record(&mut self) -> Result<(FrameRecordHeader, &[u8]), ContainerError> {
        let record = match read_frame_record(&mut self.reader, &mut self.payload) {
            Ok(record) => record,
            Err(e) => {
                if let ContainerError::TruncatedRecord { available, .. } = &e {
                    self.position += *available as u64;
                }
                return Err(e);
            }
        };

        if record.index != self.frames_read {
            return Err(FormatError::UnexpectedFrameIndex {
                expected: self.frames_read,
                found: record.index,
            }
            .into());
        }

        self.position += record.record_len();
        self.frames_read += 1;

        Ok((record, &self.payload))
    }

    /// Create an iterator over the remaining records.
    pub fn records(&mut self) -> RecordIterator<'_, R> {
        RecordIterator { reader: self }
    }
}

/// Iterator over container records, ending at end of stream.
pub struct RecordIterator<'a, R: Read> {
    reader: &'a mut ContainerReader<R>,
}

impl<'a, R: Read> Iterator for RecordIterator<'a, R> {
    type Item = Result<(FrameRecordHeader, Vec<u8>), ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.next_record() {
            Ok((record, payload)) => Some(Ok((record, payload.to_vec()))),
            Err(ContainerError::EndOfStream) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerWriter, write_frame_record};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn container_bytes(frame_count: u64, sizes: &[usize]) -> Vec<u8> {
        let mut writer =
            ContainerWriter::new(Vec::new(), FileHeader::new(64, 64, frame_count, 30.0)).unwrap();
        for &size in sizes {
            writer.write_frame(&vec![0xAB; size]).unwrap();
        }
        writer.finish().unwrap().0
    }

    #[test]
    fn test_reader_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roundtrip.evx");

        {
            let mut writer =
                ContainerWriter::create(&path, FileHeader::new(32, 16, 3, 24.0)).unwrap();
            for i in 0..3u8 {
                writer.write_frame(&[i; 10]).unwrap();
            }
            writer.finish().unwrap();
        }

        let mut reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.header().width, 32);
        assert_eq!(reader.header().height, 16);

        let records: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 3);
        for (i, (record, payload)) in records.iter().enumerate() {
            assert_eq!(record.index, i as u64);
            assert_eq!(payload, &vec![i as u8; 10]);
        }
        assert!(reader.is_exhausted());
        assert_eq!(reader.progress(), 1.0);
    }

    #[test]
    fn test_exhaustion_by_position() {
        let bytes = container_bytes(0, &[100, 120, 90, 110, 95]);
        let len = bytes.len() as u64;
        let mut reader = ContainerReader::new(Cursor::new(bytes), len).unwrap();

        let mut last = 0;
        while !reader.is_exhausted() {
            last = reader.next_record().unwrap().0.index;
        }
        assert_eq!(last, 4);
        assert_eq!(reader.frames_read(), 5);
        assert!(matches!(
            reader.next_record(),
            Err(ContainerError::EndOfStream)
        ));
    }

    #[test]
    fn test_exhaustion_by_frame_count_hint() {
        let bytes = container_bytes(2, &[10, 10, 10]);
        let len = bytes.len() as u64;
        let mut reader = ContainerReader::new(Cursor::new(bytes), len).unwrap();

        reader.next_record().unwrap();
        assert!(!reader.is_exhausted());
        reader.next_record().unwrap();
        assert!(reader.is_exhausted());
        assert!(reader.position() < reader.total_len());
    }

    #[test]
    fn test_index_gap_rejected() {
        let mut bytes = Vec::new();
        FileHeader::new(8, 8, 0, 30.0).write_to(&mut bytes).unwrap();
        write_frame_record(&mut bytes, 0, &[1]).unwrap();
        write_frame_record(&mut bytes, 2, &[2]).unwrap();

        let len = bytes.len() as u64;
        let mut reader = ContainerReader::new(Cursor::new(bytes), len).unwrap();
        reader.next_record().unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(ContainerError::Format(FormatError::UnexpectedFrameIndex {
                expected: 1,
                found: 2
            }))
        ));
    }

    #[test]
    fn test_zero_rate_fails_before_records() {
        let mut bytes = FileHeader::new(64, 64, 0, 0.0).to_bytes().to_vec();
        write_frame_record(&mut bytes, 0, &[1, 2, 3]).unwrap();

        let len = bytes.len() as u64;
        let result = ContainerReader::new(Cursor::new(bytes), len);
        assert!(matches!(
            result,
            Err(ContainerError::Format(FormatError::InvalidFrameRate(_)))
        ));
    }

    #[test]
    fn test_truncated_file() {
        let mut bytes = container_bytes(0, &[50, 50]);
        bytes.truncate(bytes.len() - 10);

        let len = bytes.len() as u64;
        let mut reader = ContainerReader::new(Cursor::new(bytes), len).unwrap();
        reader.next_record().unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(ContainerError::TruncatedRecord {
                needed: 50,
                available: 40
            })
        ));
    }
}
