//! Live codec inspection: encode a source on the fly and show codec views.

use std::time::Duration;

use super::{BitrateMeter, Command, Control, RateClock, Session, Tick};
use crate::buffer::{FrameBridge, PixelBuffer};
use crate::codec::{BlockCodec, FrameCodec, View};
use crate::error::Result;
use crate::schema::InspectConfig;
use crate::source::{FrameSource, SourceInfo};
use crate::transcode::stage_frame;

/// Encodes frames from a source as they become due and renders one of the
/// codec's internal views. Nothing is written to disk.
pub struct InspectSession<S: FrameSource, C: FrameCodec = BlockCodec> {
    source: S,
    codec: C,
    info: SourceInfo,
    bridge: FrameBridge,
    display: PixelBuffer,
    view: View,
    clock: RateClock,
    source_rate: BitrateMeter,
    encoded_rate: BitrateMeter,
    frames: u64,
    paused: bool,
    exhausted: bool,
}

impl<S: FrameSource> InspectSession<S> {
    /// Inspect `source` through the built-in block codec.
    pub fn open(source: S, config: &InspectConfig) -> Result<Self> {
        let info = source.info();
        let codec = BlockCodec::new(info.width, info.height)?;
        Self::new(source, codec, config)
    }
}

impl<S: FrameSource, C: FrameCodec> InspectSession<S, C> {
    pub fn new(mut source: S, mut codec: C, config: &InspectConfig) -> Result<Self> {
        let info = source.info().clone();
        let setup = (|| -> Result<(FrameBridge, PixelBuffer, Duration)> {
            codec.set_quality(config.quality)?;
            let interval = config.frame_interval.interval(info.frame_rate)?;
            let bridge = FrameBridge::new(info.width, info.height, &config.buffer)?;
            let display =
                PixelBuffer::with_alignment(info.width, info.height, config.buffer.row_alignment)?;
            Ok((bridge, display, interval))
        })();
        let (bridge, display, interval) = match setup {
            Ok(buffers) => buffers,
            Err(e) => {
                source.close();
                return Err(e);
            }
        };

        log::info!(
            "Inspecting {}x{} {} at {:.3} fps, quality {}",
            info.width,
            info.height,
            info.pixel_format,
            info.frame_rate,
            config.quality
        );

        Ok(Self {
            clock: RateClock::new(interval),
            source_rate: BitrateMeter::new(info.frame_rate),
            encoded_rate: BitrateMeter::new(info.frame_rate),
            source,
            codec,
            info,
            bridge,
            display,
            view: config.initial_view,
            frames: 0,
            paused: false,
            exhausted: false,
        })
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn set_view(&mut self, view: View) {
        if view != self.view {
            log::info!("View: {view}");
        }
        self.view = view;
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn render(&mut self) -> Result<()> {
        self.codec.peek(self.view, &mut self.display)?;
        Ok(())
    }

    fn encode_next(&mut self) -> Result<bool> {
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(false),
            Err(e) => {
                log::warn!("Source failed after {} frames, ending stream: {e}", self.frames);
                return Ok(false);
            }
        };

        let source_bytes = frame.encoded_size.unwrap_or(frame.pixels.len()) as u64;
        stage_frame(&frame, self.info.row_order, &mut self.bridge, &mut self.codec)?;
        let encoded_bytes = self.bridge.occupancy() as u64;
        self.bridge.reset();
        self.frames += 1;

        let source_mbps = self.source_rate.record(source_bytes);
        let encoded_mbps = self.encoded_rate.record(encoded_bytes);
        if let (Some(src), Some(enc)) = (source_mbps, encoded_mbps) {
            log::info!("Bitrate: source {src:.3} Mbps / encoded {enc:.3} Mbps");
        }
        Ok(true)
    }
}

impl<S: FrameSource, C: FrameCodec> Session for InspectSession<S, C> {
    fn tick(&mut self, now: Duration) -> Result<Tick> {
        let tick = if self.paused {
            Tick::Paused
        } else if self.exhausted {
            Tick::Ended
        } else if !self.clock.poll(now) {
            Tick::Held
        } else if self.encode_next()? {
            Tick::Advanced {
                index: self.frames - 1,
            }
        } else {
            log::info!("End of stream after {} frames", self.frames);
            self.exhausted = true;
            self.source.close();
            Tick::Ended
        };

        self.render()?;
        Ok(tick)
    }

    fn handle(&mut self, command: Command) -> Control {
        match command {
            Command::Quit => return Control::Quit,
            Command::TogglePause => {
                self.paused = !self.paused;
                log::info!("{}", if self.paused { "Paused" } else { "Resumed" });
            }
            Command::RateUp => self.clock.step_up(),
            Command::RateDown => self.clock.step_down(),
            Command::SelectView(view) => self.set_view(view),
        }
        Control::Continue
    }

    fn frame(&self) -> &PixelBuffer {
        &self.display
    }

    fn progress(&self) -> f32 {
        match self.info.frame_count_hint {
            0 => 0.0,
            total => (self.frames as f64 / total as f64).min(1.0) as f32,
        }
    }

    fn title(&self) -> String {
        format!(
            "{} - quality {} (x{})",
            self.view,
            self.codec.quality(),
            self.clock.multiplier()
        )
    }
}

impl<S: FrameSource, C: FrameCodec> Drop for InspectSession<S, C> {
    fn drop(&mut self) {
        self.source.close();
    }
}
