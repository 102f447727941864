//! Media file decoding through `ffprobe` and a streaming `ffmpeg` child process.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use serde::Deserialize;

use super::{FrameSource, SourceError, SourceFrame, SourceInfo};
use crate::buffer::RowOrder;

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<usize>,
    height: Option<usize>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    size: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeOut {
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Parse an ffprobe rate such as `30000/1001` or `25`.
pub fn parse_frame_rate(rate: &str) -> Option<f32> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value as f32)
}

/// Stream info plus the average compressed frame size, if it can be derived.
fn parse_probe(json: &[u8], path: &Path) -> Result<(SourceInfo, Option<usize>), SourceError> {
    let probe_err = |reason: String| SourceError::Probe {
        path: path.to_path_buf(),
        reason,
    };

    let parsed: ProbeOut =
        serde_json::from_slice(json).map_err(|e| probe_err(format!("json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| probe_err("no video stream found".into()))?;

    let width = stream
        .width
        .filter(|&w| w > 0)
        .ok_or_else(|| probe_err("missing video width".into()))?;
    let height = stream
        .height
        .filter(|&h| h > 0)
        .ok_or_else(|| probe_err("missing video height".into()))?;
    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| probe_err("missing frame rate".into()))?;

    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());
    // Playback stops at a non-zero count, so only a declared count is used.
    let frame_count_hint = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    let estimated_frames = match frame_count_hint {
        0 => duration.map_or(0, |d| (d * frame_rate as f64).round() as u64),
        n => n,
    };

    let file_size = parsed
        .format
        .as_ref()
        .and_then(|f| f.size.as_deref())
        .and_then(|s| s.parse::<u64>().ok());
    let average_packet = match (file_size, estimated_frames) {
        (Some(size), n) if n > 0 => Some((size / n) as usize),
        _ => None,
    };

    let info = SourceInfo {
        width,
        height,
        pixel_format: stream.pix_fmt.clone().unwrap_or_else(|| "unknown".into()),
        frame_count_hint,
        frame_rate,
        row_order: RowOrder::TopDown,
    };
    Ok((info, average_packet))
}

/// Decodes any file ffmpeg understands into top-down RGB24 frames.
pub struct FfmpegSource {
    path: PathBuf,
    info: SourceInfo,
    average_packet: Option<usize>,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    frame: Vec<u8>,
    frames_decoded: u64,
}

impl FfmpegSource {
    /// Probe `path` and start a decoder process for it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(SourceError::Open {
                path,
                reason: "no such file".into(),
            });
        }

        let out = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(&path)
            .output()
            .map_err(SourceError::Spawn)?;
        if !out.status.success() {
            return Err(SourceError::Open {
                path,
                reason: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        let (info, average_packet) = parse_probe(&out.stdout, &path)?;

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&path)
            .args(["-an", "-sn", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(SourceError::Spawn)?;
        let stdout = child.stdout.take();

        log::info!(
            "Opened {} ({}x{} {}, {:.3} fps, ~{} frames)",
            path.display(),
            info.width,
            info.height,
            info.pixel_format,
            info.frame_rate,
            info.frame_count_hint
        );

        let frame = vec![0u8; info.width * info.height * 3];
        Ok(Self {
            path,
            info,
            average_packet,
            child: Some(child),
            stdout,
            frame,
            frames_decoded: 0,
        })
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<SourceFrame<'_>>, SourceError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut filled = 0;
        while filled < self.frame.len() {
            match stdout.read(&mut self.frame[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled < self.frame.len() {
            if filled > 0 {
                log::warn!(
                    "{}: dropping partial frame ({} of {} bytes)",
                    self.path.display(),
                    filled,
                    self.frame.len()
                );
            }
            self.close();
            return Ok(None);
        }

        self.frames_decoded += 1;
        Ok(Some(SourceFrame {
            pixels: &self.frame,
            row_pitch: self.info.width * 3,
            encoded_size: self.average_packet,
        }))
    }

    fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            // Still running means the caller stopped early.
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            match child.wait() {
                Ok(status) => log::debug!(
                    "ffmpeg for {} exited with {} after {} frames",
                    self.path.display(),
                    status,
                    self.frames_decoded
                ),
                Err(e) => log::warn!("Failed to reap ffmpeg: {e}"),
            }
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.close();
    }
}
