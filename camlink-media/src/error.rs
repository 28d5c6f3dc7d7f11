//! Media error types and handling
//!
//! Capture and permission failures are caught where they happen and turned into
//! status text by the session object; nothing here is retried automatically.

use thiserror::Error;

/// Main error type for capture and encoding operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// The user or platform refused camera access
    #[error("Permission denied: {reason}")]
    PermissionDenied {
        /// Platform message
        reason: String,
    },

    /// Enumeration returned no video inputs
    #[error("No camera device available")]
    NoDevice,

    /// Acquiring a capture stream failed
    #[error("Capture failed: {reason}")]
    Capture {
        /// Underlying platform message (device unplugged, constraints unsatisfiable, ...)
        reason: String,
    },

    /// Device enumeration failed for a reason other than permission
    #[error("Device enumeration failed: {reason}")]
    DeviceEnumerationFailed {
        /// Failure reason
        reason: String,
    },

    /// Encoding operation failed
    #[error("Encoding failed: {codec} - {reason}")]
    EncodingFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// No capture stream is live
    #[error("Capture not active")]
    CaptureNotActive,
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if the user can recover by changing device or parameters
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::Capture { .. } => true,
            MediaError::EncodingFailed { .. } => true,
            MediaError::InvalidConfiguration { .. } => true,
            MediaError::CaptureNotActive => true,
            MediaError::PermissionDenied { .. } => false,
            MediaError::NoDevice => false,
            MediaError::DeviceEnumerationFailed { .. } => false,
            MediaError::InvalidFrameData { .. } => false,
        }
    }

    /// Whether the error leaves the client with no usable camera at all.
    ///
    /// These warrant a blocking notice in addition to status text.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            MediaError::PermissionDenied { .. } | MediaError::NoDevice | MediaError::Capture { .. }
        )
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::PermissionDenied { .. } => ErrorCategory::Permission,
            MediaError::NoDevice => ErrorCategory::Device,
            MediaError::Capture { .. } => ErrorCategory::Device,
            MediaError::DeviceEnumerationFailed { .. } => ErrorCategory::Device,
            MediaError::EncodingFailed { .. } => ErrorCategory::Codec,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::CaptureNotActive => ErrorCategory::State,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Camera access refused
    Permission,
    /// Device and hardware errors
    Device,
    /// Codec-related errors
    Codec,
    /// Data validation errors
    Data,
    /// Configuration and parameter errors
    Configuration,
    /// State management errors
    State,
}
