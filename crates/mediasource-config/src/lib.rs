//! Settings for capture-backed media sources.
//!
//! Settings are plain serde types so they can be loaded from a JSON file or
//! built in code with the defaults filled in.

mod error;
mod settings;

pub use error::ConfigError;
pub use mediasource_device::SampleFormat;
pub use settings::{validate_channels, validate_sample_rate, AudioSettings, SourceSettings};

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Default capture device path.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/video0";

/// Default number of chunks queued per track before the oldest is evicted.
pub const DEFAULT_TRACK_CAPACITY: usize = 64;
