//! Stream format types.

use serde::{Deserialize, Serialize};

/// Output format of a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// H.264 Annex B byte stream.
    H264,

    /// Interleaved PCM samples.
    Pcm,
}

impl PixelFormat {
    /// Codec label reported by sources carrying this format.
    pub fn codec_name(&self) -> &'static str {
        match self {
            Self::H264 => "H264",
            Self::Pcm => "PCM",
        }
    }
}

/// PCM sample format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    /// Signed 8-bit.
    S8,

    /// Unsigned 8-bit.
    U8,

    /// Signed 16-bit little endian.
    #[default]
    S16LE,
}

impl SampleFormat {
    /// Stable integer code (S8 = 0, U8 = 1, S16LE = 2).
    pub fn code(&self) -> u8 {
        match self {
            Self::S8 => 0,
            Self::U8 => 1,
            Self::S16LE => 2,
        }
    }

    /// Look up a format by its integer code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::S8),
            1 => Some(Self::U8),
            2 => Some(Self::S16LE),
            _ => None,
        }
    }

    /// Size of one sample in bytes.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::S8 | Self::U8 => 1,
            Self::S16LE => 2,
        }
    }
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// Create a new frame size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Check that both dimensions are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_codes() {
        for format in [SampleFormat::S8, SampleFormat::U8, SampleFormat::S16LE] {
            assert_eq!(SampleFormat::from_code(format.code()), Some(format));
        }
        assert_eq!(SampleFormat::from_code(3), None);
    }

    #[test]
    fn test_bytes_per_sample() {
        assert_eq!(SampleFormat::U8.bytes_per_sample(), 1);
        assert_eq!(SampleFormat::S16LE.bytes_per_sample(), 2);
    }

    #[test]
    fn test_frame_size_validity() {
        assert!(FrameSize::new(640, 480).is_valid());
        assert!(!FrameSize::new(0, 480).is_valid());
    }
}
