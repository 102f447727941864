//! Display collaborator and a headless host loop.

use std::io::Read;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Instant;

use super::{Command, Control, Session, Tick};
use crate::buffer::{BufferError, PixelBuffer};
use crate::error::Result;
use crate::schema::HostConfig;

/// Presentation surface.
pub trait Display {
    /// Show `frame` with a progress bar at `progress` in [0, 1].
    fn present(&mut self, frame: &PixelBuffer, progress: f32) -> Result<()>;

    fn set_title(&mut self, title: &str);
}

/// Display without a window. Optionally writes each presented frame as a PNG.
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    dump_dir: Option<PathBuf>,
    title: String,
    presented: u64,
}

impl HeadlessDisplay {
    pub fn new(dump_dir: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = &dump_dir {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            dump_dir,
            ..Default::default()
        })
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

impl Display for HeadlessDisplay {
    fn present(&mut self, frame: &PixelBuffer, progress: f32) -> Result<()> {
        if let Some(dir) = &self.dump_dir {
            let path = dir.join(format!("frame_{:06}.png", self.presented));
            let dims_err = || BufferError::InvalidDimensions {
                width: frame.width(),
                height: frame.height(),
            };
            image::save_buffer_with_format(
                &path,
                &frame.to_packed(),
                u32::try_from(frame.width()).map_err(|_| dims_err())?,
                u32::try_from(frame.height()).map_err(|_| dims_err())?,
                image::ColorType::Rgb8,
                image::ImageFormat::Png,
            )?;
        }
        self.presented += 1;
        log::trace!("Presented frame {} ({:.1}%)", self.presented, progress * 100.0);
        Ok(())
    }

    fn set_title(&mut self, title: &str) {
        if self.title != title {
            log::info!("{title}");
            self.title = title.to_string();
        }
    }
}

/// Forward key presses from stdin over a channel.
///
/// The reader thread exits at EOF or when the receiver is dropped.
pub fn spawn_stdin_keys() -> Receiver<char> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut byte = [0u8; 1];
        let mut stdin = std::io::stdin().lock();
        while let Ok(1) = stdin.read(&mut byte) {
            let key = byte[0] as char;
            if key == '\n' || key == '\r' {
                continue;
            }
            if tx.send(key).is_err() {
                break;
            }
        }
    });
    rx
}

/// Why a host loop ended, and what it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSummary {
    pub ticks: u64,
    pub frames_presented: u64,
    pub quit: bool,
}

/// Drives a session at a fixed tick cadence.
pub struct HeadlessHost {
    config: HostConfig,
    keys: Option<Receiver<char>>,
}

impl HeadlessHost {
    pub fn new(config: HostConfig) -> Self {
        Self { config, keys: None }
    }

    /// Take key input from `keys`.
    pub fn with_keys(mut self, keys: Receiver<char>) -> Self {
        self.keys = Some(keys);
        self
    }

    fn poll_commands(&mut self) -> Vec<Command> {
        let Some(keys) = &self.keys else {
            return Vec::new();
        };
        let mut commands = Vec::new();
        let disconnected = loop {
            match keys.try_recv() {
                Ok(key) => commands.extend(Command::from_key(key)),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if disconnected {
            log::debug!("Key input closed");
            self.keys = None;
        }
        commands
    }

    /// Run until Quit, end of stream with `exit_at_end`, or `max_ticks`.
    pub fn run<S, D>(&mut self, session: &mut S, display: &mut D) -> Result<HostSummary>
    where
        S: Session + ?Sized,
        D: Display + ?Sized,
    {
        let start = Instant::now();
        let mut summary = HostSummary {
            ticks: 0,
            frames_presented: 0,
            quit: false,
        };
        let mut dirty = true;

        display.set_title(&session.title());
        loop {
            for command in self.poll_commands() {
                if session.handle(command) == Control::Quit {
                    log::info!("Quit requested");
                    summary.quit = true;
                    return Ok(summary);
                }
                display.set_title(&session.title());
                dirty = true;
            }

            let tick = session.tick(start.elapsed())?;
            summary.ticks += 1;
            if matches!(tick, Tick::Advanced { .. }) {
                dirty = true;
            }
            if dirty {
                display.present(session.frame(), session.progress())?;
                summary.frames_presented += 1;
                dirty = false;
            }

            if tick == Tick::Ended && self.config.exit_at_end {
                return Ok(summary);
            }
            if self.config.max_ticks.is_some_and(|max| summary.ticks >= max) {
                return Ok(summary);
            }
            thread::sleep(self.config.tick_interval());
        }
    }
}
