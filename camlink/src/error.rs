//! Unified error type for the capture client

use camlink_core::CamlinkError;
use camlink_media::MediaError;
use thiserror::Error;

/// Any failure surfaced by [`CaptureClient`](crate::CaptureClient)
#[derive(Error, Debug)]
pub enum Error {
    /// Transport, TLS or configuration failure
    #[error(transparent)]
    Transport(#[from] CamlinkError),

    /// Device, capture or encoding failure
    #[error(transparent)]
    Media(#[from] MediaError),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Transport(e) => e.error_code(),
            Error::Media(e) => match e {
                MediaError::PermissionDenied { .. } => "PERMISSION_DENIED",
                MediaError::NoDevice => "NO_DEVICE",
                MediaError::Capture { .. } => "CAPTURE_ERROR",
                MediaError::DeviceEnumerationFailed { .. } => "DEVICE_ENUMERATION_FAILED",
                MediaError::EncodingFailed { .. } => "ENCODING_FAILED",
                MediaError::InvalidFrameData { .. } => "INVALID_FRAME_DATA",
                MediaError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
                MediaError::CaptureNotActive => "CAPTURE_NOT_ACTIVE",
            },
        }
    }

    /// Whether the error ended (or prevented) the connection
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(e) if e.is_transport())
    }

    /// Whether the user can recover without restarting the client
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_transport(),
            Error::Media(e) => e.is_recoverable(),
        }
    }
}
