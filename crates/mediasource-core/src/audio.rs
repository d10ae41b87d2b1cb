//! Capture-backed audio source and audio tracks.

use std::io::{self, Read};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use mediasource_config::{validate_channels, validate_sample_rate, AudioSettings, ConfigResult};
use mediasource_device::{CaptureDevice, DeviceConfig, DeviceDriver, SampleFormat};

use crate::metrics::MetricsSnapshot;
use crate::source::{CaptureSource, SourceControl};
use crate::sourcer::{AudioSourcer, MediaSource, MediaSourcer, Subscribe};
use crate::track::Track;
use crate::{MediaError, MediaResult};

/// PCM parameters in effect for an audio source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of interleaved channels.
    pub channels: u16,

    /// Sample format.
    pub format: SampleFormat,
}

impl AudioParams {
    /// Bytes in one interleaved frame (one sample per channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    fn apply(&self, device: &dyn CaptureDevice) -> MediaResult<()> {
        device.configure_audio(self.sample_rate, self.channels, self.format)?;
        Ok(())
    }
}

impl From<&AudioSettings> for AudioParams {
    fn from(settings: &AudioSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            format: settings.format,
        }
    }
}

fn check(result: ConfigResult<()>) -> MediaResult<()> {
    result.map_err(|e| MediaError::InvalidArgument(e.to_string()))
}

/// An audio source backed by a PCM capture device.
pub struct AudioCaptureSource {
    source: CaptureSource,
    params: Arc<Mutex<AudioParams>>,
}

impl AudioCaptureSource {
    /// Open the configured device and apply the initial PCM parameters.
    ///
    /// Any failure closes the device and aborts construction.
    #[instrument(name = "audio_source_open", skip_all, fields(device = %settings.device.display()))]
    pub fn open(driver: &dyn DeviceDriver, settings: &AudioSettings) -> MediaResult<Self> {
        settings.validate()?;

        let config = DeviceConfig::pcm();
        let device = driver.open(&settings.device, &config)?;

        let params = AudioParams::from(settings);
        if let Err(e) = params.apply(device.as_ref()) {
            warn!("Audio configuration failed: {}", e);
            if let Err(close_err) = device.close() {
                debug!("Failed to close device after configuration error: {}", close_err);
            }
            return Err(e);
        }

        info!(
            sample_rate = params.sample_rate,
            channels = params.channels,
            format = ?params.format,
            "Audio source opened"
        );

        Ok(Self {
            source: CaptureSource::new(device, config.format.codec_name(), settings.track_capacity),
            params: Arc::new(Mutex::new(params)),
        })
    }

    /// PCM parameters currently in effect.
    pub fn params(&self) -> AudioParams {
        *self.params.lock()
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

impl Subscribe for AudioCaptureSource {}

impl MediaSourcer for AudioCaptureSource {
    fn close(&self) -> MediaResult<()> {
        self.source.close()
    }

    fn codec(&self) -> &str {
        self.source.codec()
    }
}

impl MediaSource for AudioCaptureSource {
    fn get_track(&self) -> MediaResult<Track> {
        self.source.get_track()
    }

    fn close_track(&self, track: &Track) {
        self.source.close_track(track)
    }
}

impl AudioSourcer for AudioCaptureSource {
    fn audio(&self) -> MediaResult<AudioTrack> {
        let track = self.source.get_track()?;
        Ok(AudioTrack {
            track,
            control: self.source.control(),
            params: Arc::clone(&self.params),
        })
    }

    fn configure(&self, sample_rate: u32, channels: u16, format: SampleFormat) -> MediaResult<()> {
        check(validate_sample_rate(sample_rate))?;
        check(validate_channels(channels))?;

        let next = AudioParams {
            sample_rate,
            channels,
            format,
        };
        apply_while_idle(&self.source.control(), &self.params, "audio configuration", |p| {
            *p = next
        })?;

        info!(sample_rate, channels, format = ?format, "Audio source reconfigured");
        Ok(())
    }
}

/// Apply a parameter change to the device and record it, but only while the
/// source is idle.
fn apply_while_idle(
    control: &SourceControl,
    params: &Mutex<AudioParams>,
    what: &'static str,
    change: impl FnOnce(&mut AudioParams),
) -> MediaResult<AudioParams> {
    control.while_idle(what, |device| {
        let mut params = params.lock();
        let mut next = *params;
        change(&mut next);
        next.apply(device)?;
        *params = next;
        Ok(next)
    })
}

/// An audio track.
///
/// Sample rate, channel count and sample format are configuration-time
/// parameters shared by every track of the source. They can only change
/// while the source's device is stopped; once any track keeps it running
/// the setters fail with [`MediaError::StreamingStarted`].
pub struct AudioTrack {
    track: Track,
    control: SourceControl,
    params: Arc<Mutex<AudioParams>>,
}

impl AudioTrack {
    /// PCM parameters currently in effect.
    pub fn params(&self) -> AudioParams {
        *self.params.lock()
    }

    /// Check if the source's device is streaming.
    pub fn is_streaming(&self) -> bool {
        self.control.is_running()
    }

    /// Set the sample rate in Hz.
    pub fn set_sample_rate(&self, sample_rate: u32) -> MediaResult<()> {
        check(validate_sample_rate(sample_rate))?;
        self.update("sample rate", |p| p.sample_rate = sample_rate)
    }

    /// Set the number of interleaved channels.
    pub fn set_num_channels(&self, channels: u16) -> MediaResult<()> {
        check(validate_channels(channels))?;
        self.update("channel count", |p| p.channels = channels)
    }

    /// Set the sample format.
    pub fn set_sample_format(&self, format: SampleFormat) -> MediaResult<()> {
        self.update("sample format", |p| p.format = format)
    }

    /// Unwrap into the plain track.
    pub fn into_track(self) -> Track {
        self.track
    }

    fn update(&self, what: &'static str, change: impl FnOnce(&mut AudioParams)) -> MediaResult<()> {
        let next = apply_while_idle(&self.control, &self.params, what, change)?;
        debug!(
            track_id = %self.track.id(),
            sample_rate = next.sample_rate,
            channels = next.channels,
            format = ?next.format,
            "Audio parameters updated"
        );
        Ok(())
    }
}

impl Deref for AudioTrack {
    type Target = Track;

    fn deref(&self) -> &Track {
        &self.track
    }
}

impl DerefMut for AudioTrack {
    fn deref_mut(&mut self) -> &mut Track {
        &mut self.track
    }
}

impl Read for AudioTrack {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.track.read(buf)
    }
}
