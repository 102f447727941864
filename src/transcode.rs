//! Transcode pipeline: source frames in, container records out.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::buffer::{BufferError, FrameBridge, RowOrder};
use crate::codec::FrameCodec;
use crate::container::{ContainerWriter, FileHeader};
use crate::error::Result;
use crate::schema::TranscodeConfig;
use crate::source::{FrameSource, SourceFrame, SourceInfo};

/// Summary of a finished transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeStats {
    /// Frame records written.
    pub frames: u64,
    /// Total container size in bytes.
    pub total_bytes: u64,
    /// Average compressed payload size in bytes.
    pub average_frame_size: u64,
    pub elapsed: Duration,
    /// Set when the source failed mid-stream and the run ended early.
    pub source_error: Option<String>,
}

impl std::fmt::Display for TranscodeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} bytes total, {} bytes/frame avg in {:.2?}",
            self.frames, self.total_bytes, self.average_frame_size, self.elapsed
        )?;
        if let Some(err) = &self.source_error {
            write!(f, " (source stopped early: {err})")?;
        }
        Ok(())
    }
}

/// Build the container header for a source, rejecting unusable streams.
pub fn header_for(info: &SourceInfo) -> Result<FileHeader> {
    let dims_err = || BufferError::InvalidDimensions {
        width: info.width,
        height: info.height,
    };
    let width = u32::try_from(info.width).map_err(|_| dims_err())?;
    let height = u32::try_from(info.height).map_err(|_| dims_err())?;

    let header = FileHeader::new(width, height, info.frame_count_hint, info.frame_rate);
    header
        .validate()
        .map_err(crate::container::ContainerError::from)?;
    Ok(header)
}

/// Copy one decoded frame into the bridge and compress it into the staging
/// buffer. The staging buffer is reset first.
pub fn stage_frame<C: FrameCodec + ?Sized>(
    frame: &SourceFrame<'_>,
    order: RowOrder,
    bridge: &mut FrameBridge,
    codec: &mut C,
) -> Result<()> {
    bridge.pixels.copy_from(frame.pixels, frame.row_pitch, order)?;
    bridge.reset();
    codec.encode(&bridge.pixels, &mut bridge.staging)?;
    Ok(())
}

/// Drives a source through a codec into a container.
pub struct Transcoder {
    config: TranscodeConfig,
}

impl Transcoder {
    pub fn new(config: TranscodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    /// Transcode into a new file at `path`.
    ///
    /// Nothing is created when the source cannot produce a valid header.
    pub fn run_to_path<S, C>(
        &self,
        source: &mut S,
        codec: &mut C,
        path: impl AsRef<Path>,
    ) -> Result<TranscodeStats>
    where
        S: FrameSource + ?Sized,
        C: FrameCodec + ?Sized,
    {
        let file = match header_for(source.info()).and_then(|_| Ok(File::create(path)?)) {
            Ok(file) => file,
            Err(e) => {
                source.close();
                return Err(e);
            }
        };
        let (_, stats) = self.run(source, codec, BufWriter::new(file))?;
        Ok(stats)
    }

    /// Transcode into an arbitrary writer. The source is closed on every exit
    /// path.
    pub fn run<S, C, W>(&self, source: &mut S, codec: &mut C, output: W) -> Result<(W, TranscodeStats)>
    where
        S: FrameSource + ?Sized,
        C: FrameCodec + ?Sized,
        W: Write,
    {
        let result = self.run_inner(source, codec, output);
        source.close();
        result
    }

    fn run_inner<S, C, W>(
        &self,
        source: &mut S,
        codec: &mut C,
        output: W,
    ) -> Result<(W, TranscodeStats)>
    where
        S: FrameSource + ?Sized,
        C: FrameCodec + ?Sized,
        W: Write,
    {
        let info = source.info().clone();
        let header = header_for(&info)?;
        codec.set_quality(self.config.quality)?;

        let mut bridge = FrameBridge::new(info.width, info.height, &self.config.buffer)?;
        let mut writer = ContainerWriter::new(output, header)?;
        let progress_interval = self.config.progress_interval.max(1);
        let start = Instant::now();
        let mut source_error = None;

        loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    log::warn!(
                        "Source failed after {} frames, ending stream: {e}",
                        writer.frames_written()
                    );
                    source_error = Some(e.to_string());
                    break;
                }
            };

            stage_frame(&frame, info.row_order, &mut bridge, codec)?;
            writer.write_frame(bridge.staging.as_bytes())?;
            bridge.reset();

            let written = writer.frames_written();
            if written % progress_interval == 0 {
                match info.frame_count_hint {
                    0 => log::info!("Transcoded {written} frames"),
                    total => log::info!("Transcoded {written}/{total} frames"),
                }
            }
        }

        let (output, container) = writer.finish()?;
        let stats = TranscodeStats {
            frames: container.frame_count,
            total_bytes: container.total_bytes,
            average_frame_size: container.average_frame_size,
            elapsed: start.elapsed(),
            source_error,
        };
        log::info!("Transcode complete: {stats}");
        Ok((output, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{PixelBuffer, StagingBuffer};
    use crate::codec::{BlockCodec, MAX_QUALITY};
    use crate::container::ContainerReader;
    use crate::error::Error;
    use crate::source::{SourceError, SyntheticConfig, SyntheticSource};
    use std::io::Cursor;

    fn synthetic(frames: u64, row_order: RowOrder) -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            width: 40,
            height: 24,
            frames,
            frame_rate: 25.0,
            row_order,
            ..Default::default()
        })
    }

    fn lossless() -> Transcoder {
        Transcoder::new(TranscodeConfig {
            quality: MAX_QUALITY,
            ..Default::default()
        })
    }

    #[test]
    fn test_transcode_then_read_back() {
        let mut source = synthetic(6, RowOrder::TopDown);
        let mut codec = BlockCodec::new(40, 24).unwrap();
        let (bytes, stats) = lossless().run(&mut source, &mut codec, Vec::new()).unwrap();

        assert_eq!(stats.frames, 6);
        assert_eq!(stats.total_bytes, bytes.len() as u64);
        assert!(stats.source_error.is_none());

        let len = bytes.len() as u64;
        let mut reader = ContainerReader::new(Cursor::new(bytes), len).unwrap();
        assert_eq!(reader.header().width, 40);
        assert_eq!(reader.header().frame_count, 6);
        assert_eq!(reader.header().frame_rate, 25.0);

        let mut decoder = BlockCodec::new(40, 24).unwrap();
        let mut staging = StagingBuffer::with_capacity(1024).unwrap();
        let mut pixels = PixelBuffer::new(40, 24).unwrap();
        let mut indices = Vec::new();
        while !reader.is_exhausted() {
            let (record, payload) = reader.next_record().unwrap();
            staging.reset();
            staging.append(payload).unwrap();
            decoder.decode(&mut staging, &mut pixels).unwrap();
            assert_eq!(pixels.to_packed(), source.picture(record.index));
            indices.push(record.index);
        }
        assert_eq!(indices, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_bottom_up_source_is_corrected() {
        let mut source = synthetic(2, RowOrder::BottomUp);
        let mut codec = BlockCodec::new(40, 24).unwrap();
        let (bytes, _) = lossless().run(&mut source, &mut codec, Vec::new()).unwrap();

        let len = bytes.len() as u64;
        let mut reader = ContainerReader::new(Cursor::new(bytes), len).unwrap();
        let (_, payload) = reader.next_record().unwrap();
        let mut staging = StagingBuffer::with_capacity(1024).unwrap();
        staging.append(payload).unwrap();

        let mut decoder = BlockCodec::new(40, 24).unwrap();
        let mut pixels = PixelBuffer::new(40, 24).unwrap();
        decoder.decode(&mut staging, &mut pixels).unwrap();
        assert_eq!(pixels.to_packed(), source.picture(0));
    }

    #[test]
    fn test_run_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.evx");
        let mut source = synthetic(3, RowOrder::TopDown);
        let mut codec = BlockCodec::new(40, 24).unwrap();

        let stats = Transcoder::new(TranscodeConfig::default())
            .run_to_path(&mut source, &mut codec, &path)
            .unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), stats.total_bytes);
    }

    /// Yields `good` frames, then fails. Counts `close` calls.
    struct FlakySource {
        inner: SyntheticSource,
        good: u64,
        served: u64,
        closes: u32,
    }

    impl FrameSource for FlakySource {
        fn info(&self) -> &SourceInfo {
            self.inner.info()
        }

        fn next_frame(&mut self) -> std::result::Result<Option<SourceFrame<'_>>, SourceError> {
            if self.served == self.good {
                return Err(SourceError::Io(std::io::Error::other("decoder crashed")));
            }
            self.served += 1;
            self.inner.next_frame()
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    #[test]
    fn test_source_error_ends_stream() {
        let mut source = FlakySource {
            inner: synthetic(10, RowOrder::TopDown),
            good: 2,
            served: 0,
            closes: 0,
        };
        let mut codec = BlockCodec::new(40, 24).unwrap();
        let (bytes, stats) = lossless().run(&mut source, &mut codec, Vec::new()).unwrap();

        assert_eq!(stats.frames, 2);
        assert!(stats.source_error.is_some());
        assert_eq!(source.closes, 1);

        let len = bytes.len() as u64;
        let mut reader = ContainerReader::new(Cursor::new(bytes), len).unwrap();
        assert_eq!(reader.records().count(), 2);
    }

    #[test]
    fn test_codec_failure_is_fatal_and_closes_source() {
        let mut source = FlakySource {
            inner: synthetic(4, RowOrder::TopDown),
            good: 4,
            served: 0,
            closes: 0,
        };
        // Codec sized for a different stream.
        let mut codec = BlockCodec::new(16, 16).unwrap();
        let result = lossless().run(&mut source, &mut codec, Vec::new());

        assert!(matches!(result, Err(Error::Codec(_))));
        assert_eq!(source.closes, 1);
    }

    #[test]
    fn test_invalid_rate_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.evx");
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 16,
            height: 16,
            frames: 1,
            frame_rate: 0.0,
            ..Default::default()
        });
        let mut codec = BlockCodec::new(16, 16).unwrap();

        let result = lossless().run_to_path(&mut source, &mut codec, &path);
        assert!(matches!(result, Err(Error::Container(_))));
        assert!(!path.exists());
    }
}
