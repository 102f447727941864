//! Playback module - Tick-driven sessions presenting frames to a display.
//!
//! Sessions are single-threaded and never sleep. A host calls
//! [`Session::tick`] once per redraw with the time since it started, forwards
//! decoded key [`Command`]s, and presents [`Session::frame`].

mod clock;
mod command;
mod host;
mod inspect;
mod session;

pub use clock::{RateClock, RateStep, rate_multiplier, should_advance};
pub use command::Command;
pub use host::{Display, HeadlessDisplay, HeadlessHost, HostSummary, spawn_stdin_keys};
pub use inspect::InspectSession;
pub use session::PlaybackSession;

use std::time::Duration;

use crate::buffer::PixelBuffer;
use crate::error::Result;

/// Outcome of one redraw tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A new frame was decoded.
    Advanced { index: u64 },
    /// The clock has not authorised a new frame yet.
    Held,
    Paused,
    /// The stream is exhausted. The last frame stays on screen.
    Ended,
}

/// Whether the host should keep running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// A presentable, tick-driven session.
pub trait Session {
    fn tick(&mut self, now: Duration) -> Result<Tick>;

    fn handle(&mut self, command: Command) -> Control;

    /// Image to present for the current tick.
    fn frame(&self) -> &PixelBuffer;

    /// Fraction of the stream consumed, in [0, 1].
    fn progress(&self) -> f32;

    fn title(&self) -> String;
}

/// Accumulates byte counts and reports an average once per nominal second.
#[derive(Debug, Clone)]
pub struct BitrateMeter {
    window: u64,
    frame_rate: f32,
    frames: u64,
    bytes: u64,
}

impl BitrateMeter {
    pub fn new(frame_rate: f32) -> Self {
        Self {
            window: (frame_rate.round() as u64).max(1),
            frame_rate,
            frames: 0,
            bytes: 0,
        }
    }

    /// Frames per report.
    pub fn window(&self) -> u64 {
        self.window
    }

    /// Count one frame of `bytes`. Returns the average in Mbps whenever the
    /// frame count reaches a multiple of the window, then starts over.
    pub fn record(&mut self, bytes: u64) -> Option<f64> {
        self.frames += 1;
        self.bytes += bytes;
        if self.frames % self.window != 0 {
            return None;
        }

        let seconds = self.window as f64 / self.frame_rate as f64;
        let mbps = self.bytes as f64 * 8.0 / seconds / 1e6;
        self.bytes = 0;
        Some(mbps)
    }
}
