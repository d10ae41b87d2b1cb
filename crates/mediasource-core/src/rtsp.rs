//! Combined audio/video source over RTSP.

use tracing::warn;

use crate::sourcer::{AudioSourcer, VideoSourcer};
use crate::{MediaError, MediaResult};

/// A source multiplexing one audio and one video capability behind a
/// single handle.
///
/// No RTSP client exists yet, so [`new`](Self::new) always fails with
/// [`MediaError::NotImplemented`].
pub struct RtspAudioVideoSource {
    audio: Box<dyn AudioSourcer>,
    video: Box<dyn VideoSourcer>,
}

impl RtspAudioVideoSource {
    /// Connect to an RTSP endpoint.
    pub fn new(url: &str) -> MediaResult<Self> {
        warn!(url, "RTSP sources are not implemented");
        Err(MediaError::NotImplemented("RTSP audio/video source"))
    }

    /// The audio capability.
    pub fn audio(&self) -> &dyn AudioSourcer {
        self.audio.as_ref()
    }

    /// The video capability.
    pub fn video(&self) -> &dyn VideoSourcer {
        self.video.as_ref()
    }
}
