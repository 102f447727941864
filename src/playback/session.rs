//! Container playback session.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use super::{BitrateMeter, Command, Control, RateClock, Session, Tick};
use crate::buffer::{FrameBridge, PixelBuffer};
use crate::codec::{BlockCodec, FrameCodec};
use crate::container::{ContainerError, ContainerReader, FileHeader};
use crate::error::Result;
use crate::schema::PlaybackConfig;

/// Plays a container back one record per authorised tick.
pub struct PlaybackSession<R: Read = BufReader<File>, C: FrameCodec = BlockCodec> {
    reader: ContainerReader<R>,
    codec: C,
    bridge: FrameBridge,
    clock: RateClock,
    bitrate: BitrateMeter,
    name: String,
    paused: bool,
    exhausted: bool,
}

impl PlaybackSession {
    /// Open a container file and decode it with the built-in block codec.
    pub fn open(path: impl AsRef<Path>, config: &PlaybackConfig) -> Result<Self> {
        let path = path.as_ref();
        let reader = ContainerReader::open(path)?;
        let header = *reader.header();
        let codec = BlockCodec::new(header.width as usize, header.height as usize)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(reader, codec, config)?.with_name(name))
    }
}

impl<R: Read, C: FrameCodec> PlaybackSession<R, C> {
    pub fn new(reader: ContainerReader<R>, codec: C, config: &PlaybackConfig) -> Result<Self> {
        let header = *reader.header();
        let bridge = FrameBridge::new(
            header.width as usize,
            header.height as usize,
            &config.buffer,
        )?;
        let clock = RateClock::new(config.frame_interval.interval(header.frame_rate)?);

        log::info!(
            "Playing {}x{} at {:.3} fps ({} bytes)",
            header.width,
            header.height,
            header.frame_rate,
            reader.total_len()
        );

        Ok(Self {
            reader,
            codec,
            bridge,
            clock,
            bitrate: BitrateMeter::new(header.frame_rate),
            name: "container".to_string(),
            paused: false,
            exhausted: false,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn header(&self) -> &FileHeader {
        self.reader.header()
    }

    pub fn clock(&self) -> &RateClock {
        &self.clock
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
        log::info!("{}", if self.paused { "Paused" } else { "Resumed" });
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Frames decoded so far.
    pub fn frames_shown(&self) -> u64 {
        self.reader.frames_read()
    }

    fn read_next(&mut self) -> Result<Option<u64>> {
        let (record, payload) = match self.reader.next_record() {
            Ok(next) => next,
            Err(ContainerError::EndOfStream) => return Ok(None),
            Err(ContainerError::Io(e)) => {
                log::warn!("Read failed, ending playback: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        self.bridge.reset();
        self.bridge.staging.append(payload)?;
        self.codec
            .decode(&mut self.bridge.staging, &mut self.bridge.pixels)?;

        if let Some(mbps) = self.bitrate.record(record.record_len()) {
            log::info!("Bitrate: {mbps:.3} Mbps");
        }
        self.bridge.reset();
        Ok(Some(record.index))
    }
}

impl<R: Read, C: FrameCodec> Session for PlaybackSession<R, C> {
    fn tick(&mut self, now: Duration) -> Result<Tick> {
        if self.paused {
            return Ok(Tick::Paused);
        }
        if self.exhausted || self.reader.is_exhausted() {
            if !self.exhausted {
                log::info!("End of stream after {} frames", self.frames_shown());
            }
            self.exhausted = true;
            return Ok(Tick::Ended);
        }
        if !self.clock.poll(now) {
            return Ok(Tick::Held);
        }

        match self.read_next()? {
            Some(index) => Ok(Tick::Advanced { index }),
            None => {
                self.exhausted = true;
                Ok(Tick::Ended)
            }
        }
    }

    fn handle(&mut self, command: Command) -> Control {
        match command {
            Command::Quit => return Control::Quit,
            Command::TogglePause => self.toggle_pause(),
            Command::RateUp => self.clock.step_up(),
            Command::RateDown => self.clock.step_down(),
            Command::SelectView(view) => log::debug!("View {view} is only available in inspect mode"),
        }
        Control::Continue
    }

    fn frame(&self) -> &PixelBuffer {
        &self.bridge.pixels
    }

    fn progress(&self) -> f32 {
        self.reader.progress()
    }

    fn title(&self) -> String {
        format!("{} (x{})", self.name, self.clock.multiplier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MAX_QUALITY;
    use crate::container::ContainerWriter;
    use crate::error::Error;
    use crate::schema::{ConfigError, FrameInterval, TranscodeConfig};
    use crate::source::{SyntheticConfig, SyntheticSource};
    use crate::transcode::Transcoder;
    use std::io::Cursor;

    const W: usize = 32;
    const H: usize = 16;

    fn encoded(frames: u64) -> Vec<u8> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: W,
            height: H,
            frames,
            frame_rate: 10.0,
            ..Default::default()
        });
        let mut codec = BlockCodec::new(W, H).unwrap();
        let transcoder = Transcoder::new(TranscodeConfig {
            quality: MAX_QUALITY,
            ..Default::default()
        });
        transcoder.run(&mut source, &mut codec, Vec::new()).unwrap().0
    }

    fn session(bytes: Vec<u8>) -> PlaybackSession<Cursor<Vec<u8>>> {
        let len = bytes.len() as u64;
        let reader = ContainerReader::new(Cursor::new(bytes), len).unwrap();
        let config = PlaybackConfig {
            frame_interval: FrameInterval::TruncatedMillis,
            ..Default::default()
        };
        PlaybackSession::new(reader, BlockCodec::new(W, H).unwrap(), &config).unwrap()
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_plays_every_frame_in_order() {
        let mut session = session(encoded(4));
        let mut shown = Vec::new();
        let mut now = ms(0);
        loop {
            now += ms(100);
            match session.tick(now).unwrap() {
                Tick::Advanced { index } => shown.push(index),
                Tick::Ended => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(shown, vec![0, 1, 2, 3]);
        assert!(session.is_exhausted());
        assert_eq!(session.progress(), 1.0);

        // Stays on the last frame.
        assert_eq!(session.tick(now + ms(500)).unwrap(), Tick::Ended);
    }

    #[test]
    fn test_clock_holds_between_frames() {
        let mut session = session(encoded(3));
        assert_eq!(session.tick(ms(100)).unwrap(), Tick::Advanced { index: 0 });
        assert_eq!(session.tick(ms(150)).unwrap(), Tick::Held);
        assert_eq!(session.tick(ms(200)).unwrap(), Tick::Advanced { index: 1 });
    }

    #[test]
    fn test_pause_holds_frame() {
        let mut session = session(encoded(3));
        session.tick(ms(100)).unwrap();
        let before = session.frame().clone();
        let position = session.progress();

        assert_eq!(session.handle(Command::TogglePause), Control::Continue);
        for t in 2..10 {
            assert_eq!(session.tick(ms(t * 100)).unwrap(), Tick::Paused);
        }
        assert_eq!(session.frame(), &before);
        assert_eq!(session.progress(), position);

        session.handle(Command::TogglePause);
        assert_eq!(session.tick(ms(1100)).unwrap(), Tick::Advanced { index: 1 });
    }

    #[test]
    fn test_rate_commands() {
        let mut session = session(encoded(1));
        session.handle(Command::RateUp);
        session.handle(Command::RateUp);
        assert_eq!(session.clock().multiplier(), 3.0);
        session.handle(Command::RateDown);
        assert_eq!(session.clock().multiplier(), 2.0);
        assert_eq!(session.handle(Command::Quit), Control::Quit);
    }

    #[test]
    fn test_frame_count_hint_stops_early() {
        let mut bytes = encoded(3);
        // Declared count of 2 with 3 records present.
        bytes[17..25].copy_from_slice(&2u64.to_le_bytes());
        let mut session = session(bytes);
        assert!(matches!(session.tick(ms(100)).unwrap(), Tick::Advanced { .. }));
        assert!(matches!(session.tick(ms(200)).unwrap(), Tick::Advanced { .. }));
        assert_eq!(session.tick(ms(300)).unwrap(), Tick::Ended);
        assert_eq!(session.frames_shown(), 2);
    }

    #[test]
    fn test_truncated_record_is_fatal() {
        let mut bytes = encoded(2);
        bytes.truncate(bytes.len() - 5);
        let mut session = session(bytes);
        assert!(matches!(session.tick(ms(100)).unwrap(), Tick::Advanced { .. }));
        let err = session.tick(ms(200)).unwrap_err();
        assert!(matches!(
            err,
            Error::Container(ContainerError::TruncatedRecord { .. })
        ));
    }

    #[test]
    fn test_staging_drained_between_frames() {
        let mut session = session(encoded(2));
        assert_eq!(session.tick(ms(100)).unwrap(), Tick::Advanced { index: 0 });
        assert_eq!(session.bridge.occupancy(), 0);
        assert_eq!(session.tick(ms(200)).unwrap(), Tick::Advanced { index: 1 });
        assert_eq!(session.bridge.occupancy(), 0);
    }

    #[test]
    fn test_unrepresentable_frame_interval_is_an_error() {
        let header = FileHeader::new(W as u32, H as u32, 0, 1e-20);
        let (bytes, _) = ContainerWriter::new(Vec::new(), header)
            .unwrap()
            .finish()
            .unwrap();
        let len = bytes.len() as u64;
        let reader = ContainerReader::new(Cursor::new(bytes), len).unwrap();

        let result = PlaybackSession::new(
            reader,
            BlockCodec::new(W, H).unwrap(),
            &PlaybackConfig::default(),
        );
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidFrameRate(_)))
        ));
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.evx");
        std::fs::write(&path, encoded(2)).unwrap();

        let mut session = PlaybackSession::open(&path, &PlaybackConfig::default()).unwrap();
        assert_eq!(session.header().frame_count, 2);
        assert!(session.title().starts_with("clip.evx"));
        assert_eq!(session.tick(ms(200)).unwrap(), Tick::Advanced { index: 0 });
    }
}
