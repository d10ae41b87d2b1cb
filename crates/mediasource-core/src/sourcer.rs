//! Capabilities exposed to transport consumers.

use mediasource_device::SampleFormat;

use crate::audio::AudioTrack;
use crate::track::Track;
use crate::video::VideoTrack;
use crate::MediaResult;

/// Marker for sources that serve many independent subscribers.
pub trait Subscribe {}

/// Behavior shared by every media source.
pub trait MediaSourcer: Subscribe + Send + Sync {
    /// Force-close every outstanding track and release the device.
    fn close(&self) -> MediaResult<()>;

    /// Codec label carried by this source. Never changes.
    fn codec(&self) -> &str;
}

/// A source of video tracks.
pub trait VideoSourcer: MediaSourcer {
    /// Open a new video track.
    fn video(&self) -> MediaResult<VideoTrack>;
}

/// A source of audio tracks.
pub trait AudioSourcer: MediaSourcer {
    /// Open a new audio track.
    fn audio(&self) -> MediaResult<AudioTrack>;

    /// Set the capture parameters used by subsequent sessions.
    fn configure(&self, sample_rate: u32, channels: u16, format: SampleFormat) -> MediaResult<()>;
}

/// A source handing out plain tracks.
pub trait MediaSource: MediaSourcer {
    /// Open a new track. The first outstanding track starts the device.
    fn get_track(&self) -> MediaResult<Track>;

    /// Remove a track. Unknown or already-closed tracks are ignored.
    fn close_track(&self, track: &Track);
}
