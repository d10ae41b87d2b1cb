//! Error types for the device module.

use thiserror::Error;

/// Errors that can occur while driving a capture device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No device exists at the given path.
    #[error("Capture device not found: {0}")]
    NotFound(String),

    /// The device exists but could not be opened or configured.
    #[error("Failed to open capture device {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// The device cannot perform the requested control.
    #[error("Device control not supported: {0}")]
    NotSupported(&'static str),

    /// The device rejected a control value.
    #[error("Invalid device control value: {0}")]
    InvalidControl(String),

    /// Reading from the device failed.
    #[error("Device read failed: {0}")]
    ReadFailed(String),

    /// The device has been closed.
    #[error("Capture device closed")]
    Closed,

    /// IO error from the underlying driver.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Check if this error reports an unsupported control.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_supported_detection() {
        assert!(DeviceError::NotSupported("bitrate").is_not_supported());
        assert!(!DeviceError::Closed.is_not_supported());
    }

    #[test]
    fn test_open_failed_display() {
        let err = DeviceError::OpenFailed {
            path: "/dev/video0".into(),
            reason: "busy".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to open capture device /dev/video0: busy"
        );
    }
}
