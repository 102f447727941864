//! Block-based reference codec.
//!
//! Frames are split into 16x16 blocks (clipped at the right and bottom
//! edges). Each block is predicted either from its own DC value (intra) or
//! from the previous reconstructed frame at a half-pel motion vector (inter),
//! and the prediction residual is quantized with a per-block step chosen from
//! the quality level and the block's luma variance.
//!
//! # Payload
//!
//! ```text
//! width: 32 bits, height: 32 bits, quality: 8 bits, inter: 1 bit
//! per block, raster order:
//!   mode: 2 bits (0 = skip, 1 = intra, 2 = inter)
//!   intra: qindex 4 bits, DC r/g/b 8 bits each, residuals
//!   inter: qindex 4 bits, mv x/y se(v) in half pels, residuals
//! residuals, per channel, per 4x4 sub-block:
//!   coded flag 1 bit, then se(v) per sample if set
//! ```
//!
//! The encoder keeps its own reconstruction as the next reference so that
//! encoder and decoder predictions never drift.

use super::bits::{read_se, write_se};
use super::{CodecError, FrameCodec, View};
use crate::buffer::{PixelBuffer, StagingBuffer};

/// Block edge length in pixels.
pub const BLOCK_SIZE: usize = 16;

/// Highest quality level (lossless).
pub const MAX_QUALITY: u8 = 31;

const SUB_BLOCK: usize = 4;
const CHANNELS: usize = 3;
const COEFFS_PER_BLOCK: usize = BLOCK_SIZE * BLOCK_SIZE * CHANNELS;

/// Full-pel motion search radius.
const MOTION_RANGE: i32 = 3;

const QUANT_STEPS: [i32; 16] = [1, 2, 3, 4, 5, 6, 8, 10, 12, 14, 16, 20, 24, 32, 40, 48];

/// How a block was coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockMode {
    /// Copied from the reference frame, no residual.
    #[default]
    Skip,
    /// Predicted from its own DC value.
    Intra,
    /// Motion compensated from the reference frame.
    Inter,
}

impl BlockMode {
    fn to_bits(self) -> u32 {
        match self {
            BlockMode::Skip => 0,
            BlockMode::Intra => 1,
            BlockMode::Inter => 2,
        }
    }

    fn from_bits(v: u32) -> Option<Self> {
        match v {
            0 => Some(BlockMode::Skip),
            1 => Some(BlockMode::Intra),
            2 => Some(BlockMode::Inter),
            _ => None,
        }
    }
}

/// Coding decisions for one block of the most recent frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockInfo {
    pub mode: BlockMode,
    /// Index into the quantizer step table.
    pub qindex: u8,
    /// Motion vector in half pels.
    pub motion: (i32, i32),
    /// Luma variance of the block.
    pub variance: u32,
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: usize,
    y: usize,
    w: usize,
    h: usize,
}

/// Read-only view of an 8-bit image plane with edge extension.
#[derive(Clone, Copy)]
struct Plane<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
    channels: usize,
}

impl<'a> Plane<'a> {
    fn rgb(buf: &'a PixelBuffer) -> Self {
        Self {
            data: buf.as_bytes(),
            width: buf.width(),
            height: buf.height(),
            stride: buf.row_pitch(),
            channels: CHANNELS,
        }
    }

    fn luma(data: &'a [u8], width: usize, height: usize) -> Self {
        Self {
            data,
            width,
            height,
            stride: width,
            channels: 1,
        }
    }

    #[inline]
    fn at(&self, x: i32, y: i32, ch: usize) -> u32 {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.data[y * self.stride + x * self.channels + ch] as u32
    }

    /// Sample at a half-pel position with bilinear rounding.
    #[inline]
    fn sample_half(&self, ch: usize, hx: i32, hy: i32) -> u32 {
        let (x0, fx) = (hx.div_euclid(2), hx.rem_euclid(2));
        let (y0, fy) = (hy.div_euclid(2), hy.rem_euclid(2));
        let a = self.at(x0, y0, ch);
        match (fx, fy) {
            (0, 0) => a,
            (1, 0) => (a + self.at(x0 + 1, y0, ch) + 1) >> 1,
            (0, 1) => (a + self.at(x0, y0 + 1, ch) + 1) >> 1,
            _ => {
                (a + self.at(x0 + 1, y0, ch) + self.at(x0, y0 + 1, ch) + self.at(x0 + 1, y0 + 1, ch)
                    + 2)
                    >> 2
            }
        }
    }
}

/// Built-in [`FrameCodec`] implementation.
pub struct BlockCodec {
    width: usize,
    height: usize,
    quality: u8,
    blocks_x: usize,
    blocks_y: usize,
    source: PixelBuffer,
    /// True when `source` holds an encoded input rather than stale data.
    source_valid: bool,
    prediction: PixelBuffer,
    recon: PixelBuffer,
    reference: Option<PixelBuffer>,
    blocks: Vec<BlockInfo>,
    coeffs: Vec<i32>,
}

impl BlockCodec {
    /// Create a codec for frames of `width` x `height`.
    pub fn new(width: usize, height: usize) -> Result<Self, CodecError> {
        let blocks_x = width.div_ceil(BLOCK_SIZE);
        let blocks_y = height.div_ceil(BLOCK_SIZE);

        Ok(Self {
            width,
            height,
            quality: 20,
            blocks_x,
            blocks_y,
            source: PixelBuffer::new(width, height)?,
            source_valid: false,
            prediction: PixelBuffer::new(width, height)?,
            recon: PixelBuffer::new(width, height)?,
            reference: None,
            blocks: vec![BlockInfo::default(); blocks_x * blocks_y],
            coeffs: vec![0; COEFFS_PER_BLOCK],
        })
    }

    /// Coding decisions of the most recent frame, in raster order.
    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    /// Blocks per row and per column.
    pub fn block_grid(&self) -> (usize, usize) {
        (self.blocks_x, self.blocks_y)
    }

    /// Forget the reference frame; the next frame is coded intra only.
    pub fn reset(&mut self) {
        self.reference = None;
    }

    fn block_rect(&self, bx: usize, by: usize) -> Rect {
        let x = bx * BLOCK_SIZE;
        let y = by * BLOCK_SIZE;
        Rect {
            x,
            y,
            w: BLOCK_SIZE.min(self.width - x),
            h: BLOCK_SIZE.min(self.height - y),
        }
    }

    fn check_dims(&self, buf: &PixelBuffer) -> Result<(), CodecError> {
        if buf.width() != self.width || buf.height() != self.height {
            return Err(CodecError::DimensionMismatch {
                width: self.width,
                height: self.height,
                found_width: buf.width(),
                found_height: buf.height(),
            });
        }
        Ok(())
    }

    fn update_reference(&mut self) -> Result<(), CodecError> {
        match &mut self.reference {
            Some(reference) => reference.copy_pixels(&self.recon)?,
            None => self.reference = Some(self.recon.clone()),
        }
        Ok(())
    }

    fn render_block_map(&self, out: &mut PixelBuffer, color: impl Fn(&BlockInfo) -> [u8; 3]) {
        for by in 0..self.blocks_y {
            for bx in 0..self.blocks_x {
                let rect = self.block_rect(bx, by);
                let rgb = color(&self.blocks[by * self.blocks_x + bx]);
                for y in rect.y..rect.y + rect.h {
                    for x in rect.x..rect.x + rect.w {
                        out.set(x, y, rgb);
                    }
                }
            }
        }
    }

    fn render_block_table(&self, out: &mut PixelBuffer) {
        for y in 0..self.height {
            for x in 0..self.width {
                let info = &self.blocks[(y / BLOCK_SIZE) * self.blocks_x + x / BLOCK_SIZE];
                let rgb = if x % BLOCK_SIZE == 0 || y % BLOCK_SIZE == 0 {
                    [200, 200, 200]
                } else {
                    let l = luma(self.recon.get(x, y)) / 2;
                    match info.mode {
                        BlockMode::Skip => [l, l, l],
                        BlockMode::Intra => [l.saturating_add(128), l, l],
                        BlockMode::Inter => [l, l.saturating_add(128), l],
                    }
                };
                out.set(x, y, rgb);
            }
        }
    }
}

impl FrameCodec for BlockCodec {
    fn set_quality(&mut self, level: u8) -> Result<(), CodecError> {
        if level > MAX_QUALITY {
            return Err(CodecError::InvalidQuality {
                level,
                max: MAX_QUALITY,
            });
        }
        self.quality = level;
        Ok(())
    }

    fn quality(&self) -> u8 {
        self.quality
    }

    fn encode(
        &mut self,
        pixels: &PixelBuffer,
        staging: &mut StagingBuffer,
    ) -> Result<(), CodecError> {
        self.check_dims(pixels)?;
        self.source.copy_pixels(pixels)?;
        self.source_valid = true;

        let src_luma = luma_plane(&self.source);
        let ref_luma = self.reference.as_ref().map(luma_plane);
        let base_q = base_qindex(self.quality);

        staging.write_bits(self.width as u32, 32)?;
        staging.write_bits(self.height as u32, 32)?;
        staging.write_bits(self.quality as u32, 8)?;
        staging.write_bit(self.reference.is_some())?;

        for by in 0..self.blocks_y {
            for bx in 0..self.blocks_x {
                let rect = self.block_rect(bx, by);
                let src_plane = Plane::luma(&src_luma, self.width, self.height);
                let variance = block_variance(&src_plane, rect);
                let qindex = adaptive_qindex(base_q, variance);
                let step = QUANT_STEPS[qindex as usize];

                let source = Plane::rgb(&self.source);
                let dc = block_mean(&source, rect);
                let intra_cost = sad_dc(&source, rect, dc);

                let mut inter = None;
                if let (Some(reference), Some(ref_luma)) = (&self.reference, &ref_luma) {
                    let ref_plane = Plane::luma(ref_luma, self.width, self.height);
                    let mv = search_motion(&src_plane, &ref_plane, rect);
                    let reference = Plane::rgb(reference);
                    if sad_motion(&source, &reference, rect, mv) <= intra_cost {
                        inter = Some(mv);
                    }
                }

                match (inter, &self.reference) {
                    (Some(mv), Some(reference)) => {
                        predict_motion(reference, &mut self.prediction, rect, mv)
                    }
                    _ => predict_dc(&mut self.prediction, rect, dc),
                }

                quantize(&self.source, &self.prediction, rect, step, &mut self.coeffs);
                // `quantize` zero-fills the whole block, clipped edges included.
                let mode = match inter {
                    Some((0, 0)) if self.coeffs.iter().all(|&c| c == 0) => BlockMode::Skip,
                    Some(_) => BlockMode::Inter,
                    None => BlockMode::Intra,
                };

                staging.write_bits(mode.to_bits(), 2)?;
                match mode {
                    BlockMode::Skip => {}
                    BlockMode::Intra => {
                        staging.write_bits(qindex as u32, 4)?;
                        for c in dc {
                            staging.write_bits(c as u32, 8)?;
                        }
                        write_residuals(staging, rect, &self.coeffs)?;
                    }
                    BlockMode::Inter => {
                        let (mx, my) = inter.unwrap_or_default();
                        staging.write_bits(qindex as u32, 4)?;
                        write_se(staging, mx)?;
                        write_se(staging, my)?;
                        write_residuals(staging, rect, &self.coeffs)?;
                    }
                }

                reconstruct(&self.prediction, &self.coeffs, step, rect, &mut self.recon);
                self.blocks[by * self.blocks_x + bx] = BlockInfo {
                    mode,
                    qindex: if mode == BlockMode::Skip { 0 } else { qindex },
                    motion: inter.unwrap_or_default(),
                    variance,
                };
            }
        }

        self.update_reference()
    }

    fn decode(
        &mut self,
        staging: &mut StagingBuffer,
        pixels: &mut PixelBuffer,
    ) -> Result<(), CodecError> {
        self.check_dims(pixels)?;
        staging.rewind();

        let width = staging.read_bits(32)? as usize;
        let height = staging.read_bits(32)? as usize;
        if width != self.width || height != self.height {
            return Err(CodecError::DimensionMismatch {
                width: self.width,
                height: self.height,
                found_width: width,
                found_height: height,
            });
        }
        let _quality = staging.read_bits(8)?;
        let inter_frame = staging.read_bit()?;
        if inter_frame && self.reference.is_none() {
            return Err(CodecError::Malformed(
                "inter frame without a reference frame".into(),
            ));
        }

        for by in 0..self.blocks_y {
            for bx in 0..self.blocks_x {
                let rect = self.block_rect(bx, by);
                let mode = BlockMode::from_bits(staging.read_bits(2)?)
                    .ok_or_else(|| CodecError::Malformed("invalid block mode".into()))?;

                let reference = match (mode, &self.reference) {
                    (BlockMode::Intra, _) => None,
                    (_, Some(reference)) if inter_frame => Some(reference),
                    _ => {
                        return Err(CodecError::Malformed(
                            "predicted block in an intra frame".into(),
                        ));
                    }
                };

                let (qindex, motion) = match mode {
                    BlockMode::Skip => {
                        if let Some(reference) = reference {
                            predict_motion(reference, &mut self.prediction, rect, (0, 0));
                        }
                        self.coeffs.fill(0);
                        (0, (0, 0))
                    }
                    BlockMode::Intra => {
                        let qindex = staging.read_bits(4)? as u8;
                        let mut dc = [0u8; 3];
                        for c in dc.iter_mut() {
                            *c = staging.read_bits(8)? as u8;
                        }
                        predict_dc(&mut self.prediction, rect, dc);
                        read_residuals(staging, rect, &mut self.coeffs)?;
                        (qindex, (0, 0))
                    }
                    BlockMode::Inter => {
                        let qindex = staging.read_bits(4)? as u8;
                        let mv = (read_se(staging)?, read_se(staging)?);
                        if let Some(reference) = reference {
                            predict_motion(reference, &mut self.prediction, rect, mv);
                        }
                        read_residuals(staging, rect, &mut self.coeffs)?;
                        (qindex, mv)
                    }
                };

                let step = QUANT_STEPS[qindex as usize];
                reconstruct(&self.prediction, &self.coeffs, step, rect, &mut self.recon);
                self.blocks[by * self.blocks_x + bx] = BlockInfo {
                    mode,
                    qindex,
                    motion,
                    variance: 0,
                };
            }
        }

        let recon_luma = luma_plane(&self.recon);
        let plane = Plane::luma(&recon_luma, self.width, self.height);
        for by in 0..self.blocks_y {
            for bx in 0..self.blocks_x {
                let rect = self.block_rect(bx, by);
                self.blocks[by * self.blocks_x + bx].variance = block_variance(&plane, rect);
            }
        }

        self.source_valid = false;
        pixels.copy_pixels(&self.recon)?;
        self.update_reference()
    }

    fn peek(&self, view: View, out: &mut PixelBuffer) -> Result<(), CodecError> {
        self.check_dims(out)?;
        match view {
            View::Source if self.source_valid => out.copy_pixels(&self.source)?,
            View::Source | View::Output => out.copy_pixels(&self.recon)?,
            View::Prediction => out.copy_pixels(&self.prediction)?,
            View::BlockTable => self.render_block_table(out),
            View::QuantTable => self.render_block_map(out, |b| {
                let v = match b.mode {
                    BlockMode::Skip => 0,
                    _ => (QUANT_STEPS[b.qindex as usize] * 255 / 48) as u8,
                };
                [v, v, v]
            }),
            View::MotionTable => self.render_block_map(out, |b| match b.mode {
                BlockMode::Intra => [0, 0, 0],
                _ => {
                    let (mx, my) = b.motion;
                    let sub_pel = mx % 2 != 0 || my % 2 != 0;
                    [
                        128i32.saturating_add(mx.saturating_mul(16)).clamp(0, 255) as u8,
                        128i32.saturating_add(my.saturating_mul(16)).clamp(0, 255) as u8,
                        if sub_pel { 255 } else { 0 },
                    ]
                }
            }),
            View::Variance => self.render_block_map(out, |b| {
                let v = ((b.variance as f32).sqrt() * 4.0).min(255.0) as u8;
                [v, v, v]
            }),
        }
        Ok(())
    }
}

#[inline]
fn luma(px: [u8; 3]) -> u8 {
    ((px[0] as u32 + 2 * px[1] as u32 + px[2] as u32 + 2) / 4) as u8
}

fn luma_plane(buf: &PixelBuffer) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.width() * buf.height());
    for y in 0..buf.height() {
        out.extend(buf.row(y).chunks_exact(CHANNELS).map(|px| luma([px[0], px[1], px[2]])));
    }
    out
}

fn base_qindex(quality: u8) -> u8 {
    let max = MAX_QUALITY as u32;
    let steps = QUANT_STEPS.len() as u32 - 1;
    (((max - quality.min(MAX_QUALITY) as u32) * steps + max / 2) / max) as u8
}

/// Textured blocks hide coarser quantization; flat blocks get finer steps.
fn adaptive_qindex(base: u8, variance: u32) -> u8 {
    if base == 0 {
        return 0;
    }
    let adjust: i32 = if variance > 1000 {
        2
    } else if variance > 300 {
        1
    } else if variance < 20 {
        -1
    } else {
        0
    };
    (base as i32 + adjust).clamp(1, QUANT_STEPS.len() as i32 - 1) as u8
}

fn block_variance(plane: &Plane, rect: Rect) -> u32 {
    let mut sum = 0u64;
    let mut sum_sq = 0u64;
    for y in rect.y..rect.y + rect.h {
        for x in rect.x..rect.x + rect.w {
            let v = plane.at(x as i32, y as i32, 0) as u64;
            sum += v;
            sum_sq += v * v;
        }
    }
    let n = (rect.w * rect.h) as u64;
    ((sum_sq * n - sum * sum) / (n * n)) as u32
}

fn block_mean(plane: &Plane, rect: Rect) -> [u8; 3] {
    let n = (rect.w * rect.h) as u32;
    let mut dc = [0u8; 3];
    for (ch, out) in dc.iter_mut().enumerate() {
        let mut sum = 0u32;
        for y in rect.y..rect.y + rect.h {
            for x in rect.x..rect.x + rect.w {
                sum += plane.at(x as i32, y as i32, ch);
            }
        }
        *out = ((sum + n / 2) / n) as u8;
    }
    dc
}

fn sad_dc(plane: &Plane, rect: Rect, dc: [u8; 3]) -> u64 {
    let mut sad = 0u64;
    for y in rect.y..rect.y + rect.h {
        for x in rect.x..rect.x + rect.w {
            for (ch, &d) in dc.iter().enumerate() {
                sad += plane.at(x as i32, y as i32, ch).abs_diff(d as u32) as u64;
            }
        }
    }
    sad
}

fn sad_motion(src: &Plane, reference: &Plane, rect: Rect, mv: (i32, i32)) -> u64 {
    let mut sad = 0u64;
    for y in rect.y..rect.y + rect.h {
        for x in rect.x..rect.x + rect.w {
            let hx = 2 * x as i32 + mv.0;
            let hy = 2 * y as i32 + mv.1;
            for ch in 0..src.channels {
                let s = src.at(x as i32, y as i32, ch);
                sad += s.abs_diff(reference.sample_half(ch, hx, hy)) as u64;
            }
        }
    }
    sad
}

/// Luma SAD at `mv`, giving up once `limit` is reached.
fn sad_luma(src: &Plane, reference: &Plane, rect: Rect, mv: (i32, i32), limit: u64) -> u64 {
    let mut sad = 0u64;
    for y in rect.y..rect.y + rect.h {
        for x in rect.x..rect.x + rect.w {
            let s = src.at(x as i32, y as i32, 0);
            let p = reference.sample_half(0, 2 * x as i32 + mv.0, 2 * y as i32 + mv.1);
            sad += s.abs_diff(p) as u64;
        }
        if sad >= limit {
            break;
        }
    }
    sad
}

/// Full-pel search followed by half-pel refinement. Returns half-pel units.
fn search_motion(src: &Plane, reference: &Plane, rect: Rect) -> (i32, i32) {
    let mut best = (0, 0);
    let mut best_cost = sad_luma(src, reference, rect, best, u64::MAX);

    for dy in -MOTION_RANGE..=MOTION_RANGE {
        for dx in -MOTION_RANGE..=MOTION_RANGE {
            if best_cost == 0 {
                return best;
            }
            let mv = (dx * 2, dy * 2);
            if mv == (0, 0) {
                continue;
            }
            let cost = sad_luma(src, reference, rect, mv, best_cost);
            if cost < best_cost {
                best = mv;
                best_cost = cost;
            }
        }
    }

    let center = best;
    for dy in -1..=1 {
        for dx in -1..=1 {
            if (dx, dy) == (0, 0) || best_cost == 0 {
                continue;
            }
            let mv = (center.0 + dx, center.1 + dy);
            let cost = sad_luma(src, reference, rect, mv, best_cost);
            if cost < best_cost {
                best = mv;
                best_cost = cost;
            }
        }
    }
    best
}

fn predict_dc(pred: &mut PixelBuffer, rect: Rect, dc: [u8; 3]) {
    for y in rect.y..rect.y + rect.h {
        for x in rect.x..rect.x + rect.w {
            pred.set(x, y, dc);
        }
    }
}

fn predict_motion(reference: &PixelBuffer, pred: &mut PixelBuffer, rect: Rect, mv: (i32, i32)) {
    let plane = Plane::rgb(reference);
    for y in rect.y..rect.y + rect.h {
        for x in rect.x..rect.x + rect.w {
            let hx = (2 * x as i32).saturating_add(mv.0);
            let hy = (2 * y as i32).saturating_add(mv.1);
            let rgb = [
                plane.sample_half(0, hx, hy) as u8,
                plane.sample_half(1, hx, hy) as u8,
                plane.sample_half(2, hx, hy) as u8,
            ];
            pred.set(x, y, rgb);
        }
    }
}

#[inline]
fn coeff_index(ch: usize, ly: usize, lx: usize) -> usize {
    (ch * BLOCK_SIZE + ly) * BLOCK_SIZE + lx
}

fn quantize(src: &PixelBuffer, pred: &PixelBuffer, rect: Rect, step: i32, coeffs: &mut [i32]) {
    coeffs.fill(0);
    for ly in 0..rect.h {
        for lx in 0..rect.w {
            let s = src.get(rect.x + lx, rect.y + ly);
            let p = pred.get(rect.x + lx, rect.y + ly);
            for ch in 0..CHANNELS {
                let r = s[ch] as i32 - p[ch] as i32;
                let q = (r.abs() + (step - 1) / 2) / step;
                coeffs[coeff_index(ch, ly, lx)] = if r < 0 { -q } else { q };
            }
        }
    }
}

fn reconstruct(pred: &PixelBuffer, coeffs: &[i32], step: i32, rect: Rect, out: &mut PixelBuffer) {
    for ly in 0..rect.h {
        for lx in 0..rect.w {
            let p = pred.get(rect.x + lx, rect.y + ly);
            let mut rgb = [0u8; 3];
            for ch in 0..CHANNELS {
                let q = coeffs[coeff_index(ch, ly, lx)] as i64;
                rgb[ch] = (p[ch] as i64 + q * step as i64).clamp(0, 255) as u8;
            }
            out.set(rect.x + lx, rect.y + ly, rgb);
        }
    }
}

fn write_residuals(
    staging: &mut StagingBuffer,
    rect: Rect,
    coeffs: &[i32],
) -> Result<(), CodecError> {
    for ch in 0..CHANNELS {
        for sy in (0..rect.h).step_by(SUB_BLOCK) {
            for sx in (0..rect.w).step_by(SUB_BLOCK) {
                let ys = sy..(sy + SUB_BLOCK).min(rect.h);
                let xs = sx..(sx + SUB_BLOCK).min(rect.w);
                let coded = ys
                    .clone()
                    .any(|ly| xs.clone().any(|lx| coeffs[coeff_index(ch, ly, lx)] != 0));
                staging.write_bit(coded)?;
                if coded {
                    for ly in ys {
                        for lx in xs.clone() {
                            write_se(staging, coeffs[coeff_index(ch, ly, lx)])?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn read_residuals(
    staging: &mut StagingBuffer,
    rect: Rect,
    coeffs: &mut [i32],
) -> Result<(), CodecError> {
    coeffs.fill(0);
    for ch in 0..CHANNELS {
        for sy in (0..rect.h).step_by(SUB_BLOCK) {
            for sx in (0..rect.w).step_by(SUB_BLOCK) {
                if !staging.read_bit()? {
                    continue;
                }
                for ly in sy..(sy + SUB_BLOCK).min(rect.h) {
                    for lx in sx..(sx + SUB_BLOCK).min(rect.w) {
                        coeffs[coeff_index(ch, ly, lx)] = read_se(staging)?;
                    }
                }
            }
        }
    }
    Ok(())
}
