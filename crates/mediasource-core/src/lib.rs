//! Capture-backed media sources.
//!
//! A media source owns one capture device and hands out any number of
//! [`Track`]s. Each track receives its own copy of every chunk the device
//! produces after the track was created. The device is started when the
//! first track is opened and stopped when the last one is closed.
//!
//! ```text
//! CaptureDevice --read loop--> BufferWriter ... BufferWriter
//!                                   |                 |
//!                                 Track             Track
//! ```

mod audio;
mod buffer;
mod error;
mod metrics;
mod rtsp;
mod source;
mod sourcer;
mod track;
mod video;

pub use audio::{AudioCaptureSource, AudioParams, AudioTrack};
pub use buffer::{broadcast_buffer, BufferReader, BufferWriter, Delivery};
pub use error::MediaError;
pub use metrics::{MetricsSnapshot, SourceMetrics};
pub use rtsp::RtspAudioVideoSource;
pub use source::CaptureSource;
pub use sourcer::{AudioSourcer, MediaSource, MediaSourcer, Subscribe, VideoSourcer};
pub use track::{Track, TrackId};
pub use video::{VideoCaptureSource, VideoTrack};

pub use mediasource_device::{FrameSize, SampleFormat};

/// Result type for media source operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Size of the buffer each device read fills (256 KiB).
pub const READ_CHUNK_SIZE: usize = 256 * 1024;
