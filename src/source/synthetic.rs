//! Deterministic synthetic test pattern source.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceError, SourceFrame, SourceInfo};
use crate::buffer::RowOrder;

/// Parameters of a synthetic stream.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub width: usize,
    pub height: usize,
    /// Frames to produce before reporting end of stream.
    pub frames: u64,
    pub frame_rate: f32,
    /// Seed for per-frame grain.
    pub seed: u64,
    /// Grain amplitude (0 disables grain).
    pub grain: u8,
    /// Memory order of the produced rows.
    pub row_order: RowOrder,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            frames: 90,
            frame_rate: 30.0,
            seed: 42,
            grain: 6,
            row_order: RowOrder::TopDown,
        }
    }
}

impl SyntheticConfig {
    /// Parse `WxH:N[@FPS]`.
    pub fn parse(params: &str) -> Result<Self, SourceError> {
        let invalid = || SourceError::InvalidInput(params.to_string());

        let (dims, rest) = params.split_once(':').ok_or_else(invalid)?;
        let (w, h) = dims.split_once('x').ok_or_else(invalid)?;
        let (frames, rate) = match rest.split_once('@') {
            Some((frames, rate)) => (frames, Some(rate)),
            None => (rest, None),
        };

        let width: usize = w.parse().map_err(|_| invalid())?;
        let height: usize = h.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }

        let mut config = Self {
            width,
            height,
            frames: frames.parse().map_err(|_| invalid())?,
            ..Default::default()
        };
        if let Some(rate) = rate {
            config.frame_rate = rate.parse().map_err(|_| invalid())?;
        }
        Ok(config)
    }
}

/// Moving gradient with a bouncing square and seeded grain.
pub struct SyntheticSource {
    config: SyntheticConfig,
    info: SourceInfo,
    next_index: u64,
    frame: Vec<u8>,
    closed: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let info = SourceInfo {
            width: config.width,
            height: config.height,
            pixel_format: "rgb24".to_string(),
            frame_count_hint: config.frames,
            frame_rate: config.frame_rate,
            row_order: config.row_order,
        };
        let frame = vec![0u8; config.width * config.height * 3];

        Self {
            config,
            info,
            next_index: 0,
            frame,
            closed: false,
        }
    }

    /// Top-down RGB24 picture of frame `index`.
    pub fn picture(&self, index: u64) -> Vec<u8> {
        let (w, h) = (self.config.width, self.config.height);
        let mut out = vec![0u8; w * h * 3];
        let mut rng = StdRng::seed_from_u64(self.config.seed ^ index.wrapping_mul(0x9E37_79B9));

        let t = index as usize;
        let side = (w.min(h) / 4).max(1);
        let span_x = w.saturating_sub(side).max(1);
        let span_y = h.saturating_sub(side).max(1);
        let bounce = |pos: usize, span: usize| {
            let p = pos % (2 * span);
            if p < span { p } else { 2 * span - p }
        };
        let sq_x = bounce(t * 3, span_x);
        let sq_y = bounce(t * 2, span_y);

        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) * 3;
                let inside = x >= sq_x && x < sq_x + side && y >= sq_y && y < sq_y + side;
                let mut rgb = if inside {
                    [230, 200, 40]
                } else {
                    [
                        ((x + t * 2) * 255 / w.max(1)) as u8,
                        (y * 255 / h.max(1)) as u8,
                        ((x + y + t) % 256) as u8,
                    ]
                };
                if self.config.grain > 0 {
                    let g = self.config.grain as i16;
                    for c in rgb.iter_mut() {
                        let n: i16 = rng.gen_range(-g..=g);
                        *c = (*c as i16 + n).clamp(0, 255) as u8;
                    }
                }
                out[i..i + 3].copy_from_slice(&rgb);
            }
        }
        out
    }
}

impl FrameSource for SyntheticSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<SourceFrame<'_>>, SourceError> {
        if self.closed || self.next_index >= self.config.frames {
            return Ok(None);
        }

        let picture = self.picture(self.next_index);
        let row_len = self.config.width * 3;
        match self.config.row_order {
            RowOrder::TopDown => self.frame.copy_from_slice(&picture),
            RowOrder::BottomUp => {
                let h = self.config.height;
                for y in 0..h {
                    let dst = (h - 1 - y) * row_len;
                    self.frame[dst..dst + row_len]
                        .copy_from_slice(&picture[y * row_len..(y + 1) * row_len]);
                }
            }
        }
        self.next_index += 1;

        Ok(Some(SourceFrame {
            pixels: &self.frame,
            row_pitch: row_len,
            encoded_size: Some(self.frame.len()),
        }))
    }

    fn close(&mut self) {
        if !self.closed {
            log::debug!("Synthetic source closed after {} frames", self.next_index);
        }
        self.closed = true;
    }
}
