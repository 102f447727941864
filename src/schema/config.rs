//! Configuration types for the transcode, playback and inspect tools.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::{MAX_QUALITY, View};

fn default_quality() -> u8 {
    20
}

fn default_progress_interval() -> u64 {
    10
}

fn default_tick_interval_ms() -> u64 {
    5
}

/// Staging and pixel buffer sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Initial staging buffer capacity in bytes.
    pub staging_capacity: usize,
    /// Optional upper bound on staging growth. Exceeding it is fatal.
    pub staging_hard_cap: Option<usize>,
    /// Row pitch alignment of the pixel buffer in bytes.
    pub row_alignment: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            staging_capacity: 4 * 1024 * 1024,
            staging_hard_cap: None,
            row_alignment: 1,
        }
    }
}

/// How the nominal frame interval is derived from the frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameInterval {
    /// `1 / frame_rate` seconds, kept at full precision.
    #[default]
    Exact,
    /// `1000 / frame_rate` truncated to whole milliseconds.
    TruncatedMillis,
}

impl FrameInterval {
    /// Nominal interval between frames at `frame_rate` fps.
    ///
    /// Fails when the interval is not representable as a `Duration`, which
    /// covers non-positive rates and rates too small to ever advance.
    pub fn interval(self, frame_rate: f32) -> Result<Duration, ConfigError> {
        let invalid = || ConfigError::InvalidFrameRate(frame_rate);
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(invalid());
        }
        match self {
            FrameInterval::Exact => {
                Duration::try_from_secs_f64(1.0 / frame_rate as f64).map_err(|_| invalid())
            }
            FrameInterval::TruncatedMillis => {
                let millis = 1000.0 / frame_rate as f64;
                if millis >= u64::MAX as f64 {
                    return Err(invalid());
                }
                Ok(Duration::from_millis(millis as u64))
            }
        }
    }
}

/// Transcode tool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Codec quality level, `0..=MAX_QUALITY`.
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// Log progress every this many frames.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    #[serde(default)]
    pub buffer: BufferConfig,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            progress_interval: default_progress_interval(),
            buffer: BufferConfig::default(),
        }
    }
}

/// Playback tool settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub buffer: BufferConfig,
    pub frame_interval: FrameInterval,
}

/// Inspect tool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectConfig {
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// View shown before any key is pressed.
    #[serde(default)]
    pub initial_view: View,
    #[serde(default)]
    pub frame_interval: FrameInterval,
    #[serde(default)]
    pub buffer: BufferConfig,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            initial_view: View::Output,
            frame_interval: FrameInterval::default(),
            buffer: BufferConfig::default(),
        }
    }
}

/// Headless display host settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Redraw cadence in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Directory receiving one PNG per newly presented frame.
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
    /// Stop once the stream is exhausted instead of waiting for Quit.
    #[serde(default)]
    pub exit_at_end: bool,
    /// Hard stop after this many ticks.
    #[serde(default)]
    pub max_ticks: Option<u64>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            dump_dir: None,
            exit_at_end: false,
            max_ticks: None,
        }
    }
}

impl HostConfig {
    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Top-level configuration for the `framereel` binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub transcode: TranscodeConfig,
    pub playback: PlaybackConfig,
    pub inspect: InspectConfig,
    pub host: HostConfig,
}

impl ToolConfig {
    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ToolConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_quality(self.transcode.quality)?;
        validate_quality(self.inspect.quality)?;
        if self.transcode.progress_interval == 0 {
            return Err(ConfigError::InvalidProgressInterval);
        }
        self.transcode.buffer.validate()?;
        self.playback.buffer.validate()?;
        self.inspect.buffer.validate()?;
        if self.host.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval);
        }
        Ok(())
    }
}

impl BufferConfig {
    /// Validate buffer sizing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.row_alignment == 0 {
            return Err(ConfigError::InvalidAlignment);
        }
        if let Some(cap) = self.staging_hard_cap
            && cap < self.staging_capacity
        {
            return Err(ConfigError::HardCapBelowCapacity {
                cap,
                capacity: self.staging_capacity,
            });
        }
        Ok(())
    }
}

fn validate_quality(level: u8) -> Result<(), ConfigError> {
    if level > MAX_QUALITY {
        return Err(ConfigError::InvalidQuality {
            level,
            max: MAX_QUALITY,
        });
    }
    Ok(())
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Quality {level} out of range (max {max})")]
    InvalidQuality { level: u8, max: u8 },
    #[error("Progress interval must be non-zero")]
    InvalidProgressInterval,
    #[error("Row alignment must be non-zero")]
    InvalidAlignment,
    #[error("Staging hard cap {cap} is below the initial capacity {capacity}")]
    HardCapBelowCapacity { cap: usize, capacity: usize },
    #[error("Tick interval must be non-zero")]
    InvalidTickInterval,
    #[error("Frame rate {0} has no representable frame interval")]
    InvalidFrameRate(f32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = ToolConfig::default();
        config.validate().unwrap();
        assert_eq!(config.transcode.quality, 20);
        assert_eq!(config.transcode.progress_interval, 10);
        assert_eq!(config.transcode.buffer.staging_capacity, 4 * 1024 * 1024);
        assert_eq!(config.inspect.initial_view, View::Output);
        assert_eq!(config.playback.frame_interval, FrameInterval::Exact);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "transcode": { "quality": 31 },
            "playback": { "frame_interval": "truncated_millis" },
            "inspect": { "initial_view": "motion_table" }
        }"#;
        let config: ToolConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.transcode.quality, 31);
        assert_eq!(config.transcode.progress_interval, 10);
        assert_eq!(config.playback.frame_interval, FrameInterval::TruncatedMillis);
        assert_eq!(config.inspect.initial_view, View::MotionTable);
        assert_eq!(config.host, HostConfig::default());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ToolConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: ToolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = ToolConfig::default();
        config.transcode.quality = MAX_QUALITY + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidQuality { .. })
        ));

        let mut config = ToolConfig::default();
        config.playback.buffer.staging_hard_cap = Some(16);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HardCapBelowCapacity { .. })
        ));

        let mut config = ToolConfig::default();
        config.transcode.progress_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frame_interval_modes() {
        assert_eq!(
            FrameInterval::TruncatedMillis.interval(30.0).unwrap(),
            Duration::from_millis(33)
        );
        let exact = FrameInterval::Exact.interval(30.0).unwrap();
        assert!(exact > Duration::from_millis(33));
        assert!(exact < Duration::from_millis(34));
    }

    #[test]
    fn test_frame_interval_rejects_tiny_rate() {
        for mode in [FrameInterval::Exact, FrameInterval::TruncatedMillis] {
            assert!(matches!(
                mode.interval(1e-20),
                Err(ConfigError::InvalidFrameRate(_))
            ));
            assert!(mode.interval(0.0).is_err());
            assert!(mode.interval(f32::NAN).is_err());
        }
        // One frame every ~17 minutes is slow but representable.
        let slow = FrameInterval::Exact.interval(0.001).unwrap();
        assert!(slow > Duration::from_secs(999) && slow < Duration::from_secs(1001));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "host": {{ "exit_at_end": true }} }}"#).unwrap();
        let config = ToolConfig::load(file.path()).unwrap();
        assert!(config.host.exit_at_end);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, r#"{{ "transcode": {{ "quality": 99 }} }}"#).unwrap();
        assert!(matches!(
            ToolConfig::load(bad.path()),
            Err(ConfigError::InvalidQuality { .. })
        ));
    }
}
