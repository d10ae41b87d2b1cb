//! Error types for media sources.

use thiserror::Error;

use mediasource_config::ConfigError;
use mediasource_device::DeviceError;

/// Errors that can occur while opening or driving a media source.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The capture device failed to open or rejected a request.
    #[error("Capture device error: {0}")]
    Device(#[source] DeviceError),

    /// The backing device cannot perform the requested control.
    #[error("Not supported: {0}")]
    NotSupported(&'static str),

    /// The source type has no implementation.
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// The source has been closed.
    #[error("Media source closed")]
    SourceClosed,

    /// A device read failed earlier; the source cannot be reopened.
    #[error("Capture device failed, media source is no longer usable")]
    DeviceFailed,

    /// A configuration-time parameter was changed after data started flowing.
    #[error("Cannot change {0} after streaming has started")]
    StreamingStarted(&'static str),

    /// A control value is out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Source settings are invalid.
    #[error("Invalid settings: {0}")]
    Config(#[from] ConfigError),

    /// The read loop thread could not be spawned.
    #[error("Failed to spawn read loop: {0}")]
    Spawn(#[source] std::io::Error),
}

impl MediaError {
    /// Check if this error reports an unsupported control.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported(_))
    }
}

impl From<DeviceError> for MediaError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::NotSupported(what) => Self::NotSupported(what),
            other => Self::Device(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_supported_maps_to_not_supported() {
        let err: MediaError = DeviceError::NotSupported("frame rate").into();
        assert!(err.is_not_supported());
        assert_eq!(err.to_string(), "Not supported: frame rate");
    }

    #[test]
    fn test_other_device_errors_are_wrapped() {
        let err: MediaError = DeviceError::NotFound("/dev/video3".into()).into();
        assert!(matches!(err, MediaError::Device(DeviceError::NotFound(_))));
    }
}
