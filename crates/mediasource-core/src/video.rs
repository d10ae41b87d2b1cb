//! Capture-backed video source and video tracks.

use std::io::{self, Read};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use mediasource_config::SourceSettings;
use mediasource_device::{CaptureDevice, DeviceConfig, DeviceDriver, FrameSize};

use crate::metrics::MetricsSnapshot;
use crate::source::CaptureSource;
use crate::sourcer::{MediaSource, MediaSourcer, Subscribe, VideoSourcer};
use crate::track::Track;
use crate::{MediaError, MediaResult};

/// A video source backed by an H.264 encoding capture device.
pub struct VideoCaptureSource {
    source: CaptureSource,
}

impl VideoCaptureSource {
    /// Open the configured device, apply the initial bitrate and flips.
    ///
    /// Any failure closes the device and aborts construction.
    #[instrument(name = "video_source_open", skip_all, fields(device = %settings.device.display()))]
    pub fn open(driver: &dyn DeviceDriver, settings: &SourceSettings) -> MediaResult<Self> {
        settings.validate()?;

        let config = DeviceConfig::h264(settings.width, settings.height);
        let device = driver.open(&settings.device, &config)?;

        if let Err(e) = configure_device(device.as_ref(), settings) {
            warn!("Device configuration failed: {}", e);
            if let Err(close_err) = device.close() {
                debug!("Failed to close device after configuration error: {}", close_err);
            }
            return Err(e);
        }

        info!(
            width = settings.width,
            height = settings.height,
            bitrate = settings.bitrate,
            hflip = settings.hflip,
            vflip = settings.vflip,
            "Video source opened"
        );

        Ok(Self {
            source: CaptureSource::new(device, config.format.codec_name(), settings.track_capacity),
        })
    }

    /// Number of tracks currently open.
    pub fn track_count(&self) -> usize {
        self.source.track_count()
    }

    /// Check if the device is streaming.
    pub fn is_running(&self) -> bool {
        self.source.is_running()
    }

    /// Snapshot of this source's counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.source.metrics()
    }
}

fn configure_device(device: &dyn CaptureDevice, settings: &SourceSettings) -> MediaResult<()> {
    device.set_bitrate(settings.bitrate)?;
    if settings.hflip {
        device.flip_horizontal()?;
    }
    if settings.vflip {
        device.flip_vertical()?;
    }
    Ok(())
}

impl Subscribe for VideoCaptureSource {}

impl MediaSourcer for VideoCaptureSource {
    fn close(&self) -> MediaResult<()> {
        self.source.close()
    }

    fn codec(&self) -> &str {
        self.source.codec()
    }
}

impl MediaSource for VideoCaptureSource {
    fn get_track(&self) -> MediaResult<Track> {
        self.source.get_track()
    }

    fn close_track(&self, track: &Track) {
        self.source.close_track(track)
    }
}

impl VideoSourcer for VideoCaptureSource {
    fn video(&self) -> MediaResult<VideoTrack> {
        let track = self.source.get_track()?;
        Ok(VideoTrack::new(track, Arc::clone(self.source.device())))
    }
}

/// A video track with runtime encoder controls.
///
/// Controls may be called mid-stream and take effect on a best-effort
/// basis. Controls the device cannot honor fail with
/// [`MediaError::NotSupported`] and leave the stream running.
pub struct VideoTrack {
    track: Track,
    device: Arc<dyn CaptureDevice>,
}

impl VideoTrack {
    pub(crate) fn new(track: Track, device: Arc<dyn CaptureDevice>) -> Self {
        Self { track, device }
    }

    /// Request an immediate IDR frame.
    pub fn force_idr(&self) -> MediaResult<()> {
        self.device.force_key_frame()?;
        debug!(track_id = %self.track.id(), "IDR requested");
        Ok(())
    }

    /// Set the encoder bitrate in bits per second.
    pub fn set_bit_rate(&self, bitrate: u32) -> MediaResult<()> {
        if bitrate == 0 {
            return Err(MediaError::InvalidArgument("bitrate must be non-zero".into()));
        }
        self.device.set_bitrate(bitrate)?;
        debug!(track_id = %self.track.id(), bitrate, "Bitrate changed");
        Ok(())
    }

    /// Set the encoder frame rate in frames per second.
    pub fn set_frame_rate(&self, fps: u32) -> MediaResult<()> {
        if fps == 0 {
            return Err(MediaError::InvalidArgument("frame rate must be non-zero".into()));
        }
        self.device.set_frame_rate(fps)?;
        debug!(track_id = %self.track.id(), fps, "Frame rate changed");
        Ok(())
    }

    /// Set the encoded frame size.
    pub fn set_frame_size(&self, size: FrameSize) -> MediaResult<()> {
        if !size.is_valid() {
            return Err(MediaError::InvalidArgument(format!(
                "{}x{} is not a frame size",
                size.width, size.height
            )));
        }
        self.device.set_frame_size(size)?;
        debug!(
            track_id = %self.track.id(),
            width = size.width,
            height = size.height,
            "Frame size changed"
        );
        Ok(())
    }

    /// Unwrap into the plain track.
    pub fn into_track(self) -> Track {
        self.track
    }
}

impl Deref for VideoTrack {
    type Target = Track;

    fn deref(&self) -> &Track {
        &self.track
    }
}

impl DerefMut for VideoTrack {
    fn deref_mut(&mut self) -> &mut Track {
        &mut self.track
    }
}

impl Read for VideoTrack {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.track.read(buf)
    }
}
