//! Source settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mediasource_device::SampleFormat;

use crate::error::ConfigError;
use crate::{ConfigResult, DEFAULT_DEVICE_PATH, DEFAULT_TRACK_CAPACITY};

/// Settings for opening a capture-backed video source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Capture device path (e.g., "/dev/video0").
    pub device: PathBuf,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Initial encoder bitrate in bits per second.
    pub bitrate: u32,

    /// Mirror the image horizontally.
    pub hflip: bool,

    /// Mirror the image vertically.
    pub vflip: bool,

    /// Chunks queued per track before the oldest is evicted.
    pub track_capacity: usize,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE_PATH),
            width: 1280,
            height: 720,
            bitrate: 2_000_000,
            hflip: false,
            vflip: false,
            track_capacity: DEFAULT_TRACK_CAPACITY,
        }
    }
}

impl SourceSettings {
    /// Settings for the device at `path` with default values elsewhere.
    pub fn for_device(path: impl Into<PathBuf>) -> Self {
        Self {
            device: path.into(),
            ..Default::default()
        }
    }

    /// Parse settings from a JSON document.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Check that every field holds a usable value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.device.as_os_str().is_empty() {
            return Err(ConfigError::invalid("device", "path is empty"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::invalid(
                "width/height",
                format!("{}x{} is not a frame size", self.width, self.height),
            ));
        }
        if self.bitrate == 0 {
            return Err(ConfigError::invalid("bitrate", "must be non-zero"));
        }
        if self.track_capacity == 0 {
            return Err(ConfigError::invalid("track_capacity", "must be non-zero"));
        }
        Ok(())
    }
}

/// Settings for opening a capture-backed audio source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Capture device path.
    pub device: PathBuf,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of interleaved channels.
    pub channels: u16,

    /// Sample format.
    pub format: SampleFormat,

    /// Chunks queued per track before the oldest is evicted.
    pub track_capacity: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device: PathBuf::from("default"),
            sample_rate: 48000,
            channels: 2,
            format: SampleFormat::S16LE,
            track_capacity: DEFAULT_TRACK_CAPACITY,
        }
    }
}

impl AudioSettings {
    /// Parse settings from a JSON document.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that every field holds a usable value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.device.as_os_str().is_empty() {
            return Err(ConfigError::invalid("device", "path is empty"));
        }
        validate_sample_rate(self.sample_rate)?;
        validate_channels(self.channels)?;
        if self.track_capacity == 0 {
            return Err(ConfigError::invalid("track_capacity", "must be non-zero"));
        }
        Ok(())
    }
}

/// Reject sample rates no capture hardware produces.
pub fn validate_sample_rate(sample_rate: u32) -> ConfigResult<()> {
    if !(1000..=384_000).contains(&sample_rate) {
        return Err(ConfigError::invalid(
            "sample_rate",
            format!("{} Hz is out of range", sample_rate),
        ));
    }
    Ok(())
}

/// Reject channel counts outside 1..=8.
pub fn validate_channels(channels: u16) -> ConfigResult<()> {
    if channels == 0 || channels > 8 {
        return Err(ConfigError::invalid(
            "channels",
            format!("{} channels is out of range", channels),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        SourceSettings::default().validate().unwrap();
        AudioSettings::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings =
            SourceSettings::from_json_str(r#"{ "device": "/dev/video2", "vflip": true }"#)
                .unwrap();

        assert_eq!(settings.device, PathBuf::from("/dev/video2"));
        assert!(settings.vflip);
        assert!(!settings.hflip);
        assert_eq!(settings.width, 1280);
        assert_eq!(settings.track_capacity, DEFAULT_TRACK_CAPACITY);
    }

    #[test]
    fn test_zero_bitrate_rejected() {
        let result = SourceSettings::from_json_str(r#"{ "bitrate": 0 }"#);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "bitrate",
                ..
            })
        ));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let result = SourceSettings::from_json_str("{ width: ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_audio_format_from_json() {
        let settings =
            AudioSettings::from_json_str(r#"{ "sample_rate": 16000, "channels": 1, "format": "U8" }"#)
                .unwrap();
        assert_eq!(settings.sample_rate, 16000);
        assert_eq!(settings.channels, 1);
        assert_eq!(settings.format, SampleFormat::U8);
    }

    #[test]
    fn test_audio_channel_range() {
        assert!(validate_channels(0).is_err());
        assert!(validate_channels(2).is_ok());
        assert!(validate_channels(9).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = SourceSettings::load("/nonexistent/mediasource.json");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
