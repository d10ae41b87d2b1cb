//! Capture device adapter contract.
//!
//! A capture device produces encoded or raw media bytes from hardware or a
//! virtual source. Media sources drive devices exclusively through the
//! [`CaptureDevice`] trait and open them through a [`DeviceDriver`], so the
//! low-level driver (ioctls, buffer queues) stays outside this workspace.
//!
//! [`VirtualDevice`] is a scripted in-process device used by tests and the
//! demo binary.

mod error;
mod format;
mod virtual_device;

pub use error::DeviceError;
pub use format::{FrameSize, PixelFormat, SampleFormat};
pub use virtual_device::{DeviceControls, VirtualDevice, VirtualDriver};

use std::path::Path;
use std::sync::Arc;

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Configuration applied when a device is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Frame width in pixels (zero for audio devices).
    pub width: u32,

    /// Frame height in pixels (zero for audio devices).
    pub height: u32,

    /// Output format.
    pub format: PixelFormat,

    /// Whether the encoder repeats SPS/PPS before every key frame.
    pub repeat_sequence_header: bool,
}

impl DeviceConfig {
    /// Configuration for an H.264 encoding video device.
    pub fn h264(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::H264,
            repeat_sequence_header: true,
        }
    }

    /// Configuration for a PCM audio device.
    pub fn pcm() -> Self {
        Self {
            width: 0,
            height: 0,
            format: PixelFormat::Pcm,
            repeat_sequence_header: false,
        }
    }
}

/// A capture device driven by a media source.
///
/// All methods take `&self`: a blocked [`read`](CaptureDevice::read) must be
/// unblocked by a concurrent [`stop`](CaptureDevice::stop) or
/// [`close`](CaptureDevice::close), so implementations synchronize
/// internally. Serializing runtime controls is also the device's job.
pub trait CaptureDevice: Send + Sync {
    /// Begin producing data.
    fn start(&self) -> DeviceResult<()>;

    /// Stop producing data. A read in flight returns `Ok(0)` or an error.
    fn stop(&self) -> DeviceResult<()>;

    /// Block until a chunk is available and copy it into `buf`.
    ///
    /// Returns the number of bytes written. `Ok(0)` is a terminal read.
    fn read(&self, buf: &mut [u8]) -> DeviceResult<usize>;

    /// Release the device. Further calls fail with [`DeviceError::Closed`].
    fn close(&self) -> DeviceResult<()>;

    /// Set the encoder bitrate in bits per second.
    fn set_bitrate(&self, _bitrate: u32) -> DeviceResult<()> {
        Err(DeviceError::NotSupported("bitrate"))
    }

    /// Mirror the image horizontally.
    fn flip_horizontal(&self) -> DeviceResult<()> {
        Err(DeviceError::NotSupported("horizontal flip"))
    }

    /// Mirror the image vertically.
    fn flip_vertical(&self) -> DeviceResult<()> {
        Err(DeviceError::NotSupported("vertical flip"))
    }

    /// Ask the encoder for an immediate key frame.
    fn force_key_frame(&self) -> DeviceResult<()> {
        Err(DeviceError::NotSupported("key frame request"))
    }

    /// Change the frame rate while streaming.
    fn set_frame_rate(&self, _fps: u32) -> DeviceResult<()> {
        Err(DeviceError::NotSupported("frame rate"))
    }

    /// Change the frame size while streaming.
    fn set_frame_size(&self, _size: FrameSize) -> DeviceResult<()> {
        Err(DeviceError::NotSupported("frame size"))
    }

    /// Configure PCM output. Takes effect before the next sample is produced.
    fn configure_audio(
        &self,
        _sample_rate: u32,
        _channels: u16,
        _format: SampleFormat,
    ) -> DeviceResult<()> {
        Err(DeviceError::NotSupported("audio configuration"))
    }
}

/// Opens capture devices by path.
pub trait DeviceDriver: Send + Sync {
    /// Open and configure the device at `path`.
    fn open(&self, path: &Path, config: &DeviceConfig) -> DeviceResult<Arc<dyn CaptureDevice>>;
}
